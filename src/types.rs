/// Phase value of a record that never requested incremental binding.
pub const PHASE_NOT_SPECIFIED: i32 = i32::MIN;
/// Phase value reported by a binding component once no further phase remains.
pub const PHASE_REACHED_END: i32 = -1;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle in host coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const EMPTY: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    /// Bounds of an element that has not been arranged yet.
    pub const INVALID: Self = Self::new(-1.0, -1.0, -1.0, -1.0);

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Edge-inclusive overlap test. Rectangles without positive area never intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.width <= 0.0 || self.height <= 0.0 || other.width <= 0.0 || other.height <= 0.0 {
            return false;
        }
        other.x <= self.x + self.width
            && other.x + other.width >= self.x
            && other.y <= self.y + self.height
            && other.y + other.height >= self.y
    }
}

/// Which pool or party currently owns a realized element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementOwner {
    /// Back with the element factory; index is meaningless.
    #[default]
    Unrealized,
    /// Held by the layout at a valid index.
    Active,
    /// Kept alive by pins although the layout no longer asked for it.
    Pinned,
    /// Parked in the stable-key reset pool awaiting a key match.
    StableKeyPending,
    /// Playing an exit animation; released once the animator reports completion.
    ExitAnimating,
}

impl ElementOwner {
    /// Whether the owner keeps the element realized (held by layout or pinned).
    pub fn is_realized(self) -> bool {
        matches!(self, Self::Active | Self::Pinned)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FocusState {
    #[default]
    Unfocused,
    Pointer,
    Keyboard,
    Programmatic,
}

/// Inclusive index range the layout is known to hold. May be looser than the real set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexBounds {
    pub first: usize,
    pub last: usize,
}

impl IndexBounds {
    pub fn contains(&self, index: usize) -> bool {
        self.first <= index && index <= self.last
    }
}

/// Layout passes the host owes its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Invalidation {
    pub(crate) measure: bool,
    pub(crate) arrange: bool,
}

impl Invalidation {
    pub(crate) fn invalidate_measure(&mut self) {
        self.measure = true;
    }

    pub(crate) fn invalidate_arrange(&mut self) {
        self.arrange = true;
    }
}
