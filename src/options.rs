use alloc::rc::Rc;

use crate::{Point, RepeaterError};

/// Fired after an element was realized for `index` and attached to the host.
pub type ElementPreparedCallback<E> = Rc<dyn Fn(&E, usize)>;

/// Fired right before an element goes back to the factory.
pub type ElementClearingCallback<E> = Rc<dyn Fn(&E)>;

/// Fired when a collection change moves a realized element: `(element, old_index, new_index)`.
pub type ElementIndexChangedCallback<E> = Rc<dyn Fn(&E, usize, usize)>;

/// Per-side pixels the cache buffer grows by after each arrange pass.
pub const DEFAULT_CACHE_BUFFER_INFLATION: f64 = 40.0;

/// Where elements that left realization are parked so hit-testing and focus ignore them.
pub const CLEARED_ELEMENTS_ARRANGE_POSITION: Point = Point::new(-10000.0, -10000.0);

/// Configuration for [`crate::Repeater`].
///
/// Callbacks are stored in `Rc`s, so cloning the options to tweak a field is cheap.
pub struct RepeaterOptions<E> {
    /// Horizontal cache size, in multiples of the visible width (split across both sides).
    pub horizontal_cache_length: f64,
    /// Vertical cache size, in multiples of the visible height (split across both sides).
    pub vertical_cache_length: f64,
    pub cache_buffer_inflation: f64,

    /// Layout-extent shifts at or below this magnitude never wait for a layout-updated signal.
    pub viewport_shift_tolerance: f32,

    pub cleared_elements_arrange_position: Point,

    pub on_element_prepared: Option<ElementPreparedCallback<E>>,
    pub on_element_clearing: Option<ElementClearingCallback<E>>,
    pub on_element_index_changed: Option<ElementIndexChangedCallback<E>>,
}

impl<E> Clone for RepeaterOptions<E> {
    fn clone(&self) -> Self {
        Self {
            horizontal_cache_length: self.horizontal_cache_length,
            vertical_cache_length: self.vertical_cache_length,
            cache_buffer_inflation: self.cache_buffer_inflation,
            viewport_shift_tolerance: self.viewport_shift_tolerance,
            cleared_elements_arrange_position: self.cleared_elements_arrange_position,
            on_element_prepared: self.on_element_prepared.clone(),
            on_element_clearing: self.on_element_clearing.clone(),
            on_element_index_changed: self.on_element_index_changed.clone(),
        }
    }
}

impl<E> Default for RepeaterOptions<E> {
    fn default() -> Self {
        Self {
            horizontal_cache_length: 2.0,
            vertical_cache_length: 2.0,
            cache_buffer_inflation: DEFAULT_CACHE_BUFFER_INFLATION,
            viewport_shift_tolerance: 1.0,
            cleared_elements_arrange_position: CLEARED_ELEMENTS_ARRANGE_POSITION,
            on_element_prepared: None,
            on_element_clearing: None,
            on_element_index_changed: None,
        }
    }
}

impl<E> RepeaterOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_lengths(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal_cache_length = horizontal;
        self.vertical_cache_length = vertical;
        self
    }

    pub fn with_cache_buffer_inflation(mut self, pixels: f64) -> Self {
        self.cache_buffer_inflation = pixels;
        self
    }

    pub fn with_viewport_shift_tolerance(mut self, pixels: f32) -> Self {
        self.viewport_shift_tolerance = pixels;
        self
    }

    pub fn with_on_element_prepared(mut self, f: impl Fn(&E, usize) + 'static) -> Self {
        self.on_element_prepared = Some(Rc::new(f));
        self
    }

    pub fn with_on_element_clearing(mut self, f: impl Fn(&E) + 'static) -> Self {
        self.on_element_clearing = Some(Rc::new(f));
        self
    }

    pub fn with_on_element_index_changed(
        mut self,
        f: impl Fn(&E, usize, usize) + 'static,
    ) -> Self {
        self.on_element_index_changed = Some(Rc::new(f));
        self
    }

    pub fn validate(&self) -> Result<(), RepeaterError> {
        validate_cache_length(self.horizontal_cache_length)?;
        validate_cache_length(self.vertical_cache_length)?;
        if !self.cache_buffer_inflation.is_finite() || self.cache_buffer_inflation < 0.0 {
            return Err(RepeaterError::InvalidCacheLength(self.cache_buffer_inflation));
        }
        Ok(())
    }

    pub(crate) fn notify_prepared(&self, element: &E, index: usize) {
        if let Some(cb) = &self.on_element_prepared {
            cb(element, index);
        }
    }

    pub(crate) fn notify_clearing(&self, element: &E) {
        if let Some(cb) = &self.on_element_clearing {
            cb(element);
        }
    }

    pub(crate) fn notify_index_changed(&self, element: &E, old: usize, new: usize) {
        if let Some(cb) = &self.on_element_index_changed {
            cb(element, old, new);
        }
    }
}

impl<E> core::fmt::Debug for RepeaterOptions<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RepeaterOptions")
            .field("horizontal_cache_length", &self.horizontal_cache_length)
            .field("vertical_cache_length", &self.vertical_cache_length)
            .field("cache_buffer_inflation", &self.cache_buffer_inflation)
            .field("viewport_shift_tolerance", &self.viewport_shift_tolerance)
            .field(
                "cleared_elements_arrange_position",
                &self.cleared_elements_arrange_position,
            )
            .finish_non_exhaustive()
    }
}

pub(crate) fn validate_cache_length(length: f64) -> Result<(), RepeaterError> {
    if length < 0.0 || !length.is_finite() {
        return Err(RepeaterError::InvalidCacheLength(length));
    }
    Ok(())
}
