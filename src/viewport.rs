use alloc::vec::Vec;

use crate::options::validate_cache_length;
use crate::types::Invalidation;
use crate::{ElementKey, Point, Rect, RepeaterError, RepeaterOptions};

/// Two viewports closer than this on every edge count as unchanged.
const VIEWPORT_ROUNDING_TOLERANCE: f32 = 0.01;

fn abs(v: f32) -> f32 {
    if v < 0.0 { -v } else { v }
}

/// A snapshot of the window tracker, suitable for diagnostics and persistence.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowState {
    pub visible_window: Rect,
    pub realization_window: Rect,
    pub layout_extent: Rect,
    pub horizontal_cache_buffer: f64,
    pub vertical_cache_buffer: f64,
    pub expected_shift: Point,
    pub pending_shift: Point,
    pub unshiftable_shift: Point,
}

/// Turns viewport signals from the host into the realization window the layout works against.
///
/// The visible window is whatever the host last reported. Around it the tracker grows a cache
/// buffer by `cache_buffer_inflation` after every arrange, up to
/// `cache_length * visible_extent / 2` per side.
///
/// When a layout moves its extent origin (content grew above the viewport, say) the tracker
/// expects the host to scroll by the same amount. A shift that has not shown up by the next
/// layout-updated signal is folded into a permanent "unshiftable" offset.
#[derive(Clone, Debug)]
pub struct ViewportTracker<E> {
    visible_window: Rect,
    layout_extent: Rect,
    last_realization_window: Rect,

    expected_shift: Point,
    pending_shift: Point,
    unshiftable_shift: Point,

    horizontal_buffer: f64,
    vertical_buffer: f64,
    horizontal_cache_length: f64,
    vertical_cache_length: f64,
    inflation: f64,
    shift_tolerance: f32,
    cleared_position: Point,

    managing_disabled: bool,
    has_scroller: bool,
    scroller_offset: Point,
    scroller_anchor: Option<E>,

    made_anchor: Option<E>,
    anchor_outside_realized_range: bool,
    bring_into_view_in_progress: bool,

    cache_build_outstanding: bool,
    awaiting_layout_updated: bool,

    prepared: Vec<E>,
    prepared_and_arranged: Vec<E>,
    anchor_candidates: Vec<E>,
}

impl<E: ElementKey> ViewportTracker<E> {
    pub(crate) fn new(options: &RepeaterOptions<E>) -> Self {
        Self {
            visible_window: Rect::EMPTY,
            layout_extent: Rect::EMPTY,
            last_realization_window: Rect::EMPTY,
            expected_shift: Point::ZERO,
            pending_shift: Point::ZERO,
            unshiftable_shift: Point::ZERO,
            horizontal_buffer: 0.0,
            vertical_buffer: 0.0,
            horizontal_cache_length: options.horizontal_cache_length,
            vertical_cache_length: options.vertical_cache_length,
            inflation: options.cache_buffer_inflation,
            shift_tolerance: options.viewport_shift_tolerance,
            cleared_position: options.cleared_elements_arrange_position,
            managing_disabled: false,
            has_scroller: true,
            scroller_offset: Point::ZERO,
            scroller_anchor: None,
            made_anchor: None,
            anchor_outside_realized_range: false,
            bring_into_view_in_progress: false,
            cache_build_outstanding: false,
            awaiting_layout_updated: false,
            prepared: Vec::new(),
            prepared_and_arranged: Vec::new(),
            anchor_candidates: Vec::new(),
        }
    }

    pub(crate) fn apply_options(
        &mut self,
        options: &RepeaterOptions<E>,
    ) -> Result<(), RepeaterError> {
        self.set_cache_lengths(
            options.horizontal_cache_length,
            options.vertical_cache_length,
        )?;
        self.inflation = options.cache_buffer_inflation;
        self.shift_tolerance = options.viewport_shift_tolerance;
        self.cleared_position = options.cleared_elements_arrange_position;
        Ok(())
    }

    /// The window last reported by the host, untouched by extent or shift corrections.
    pub fn visible_window(&self) -> Rect {
        self.visible_window
    }

    /// The visible window in layout coordinates.
    ///
    /// While an anchor made outside the realized range is pending, the window collapses to the
    /// origin so the layout re-anchors on that element.
    pub fn layout_visible_window(&self) -> Rect {
        let mut window = self.visible_window;
        if self.made_anchor.is_some() && self.anchor_outside_realized_range {
            window.x = 0.0;
            window.y = 0.0;
        } else if self.has_scroller {
            window.x += self.layout_extent.x + self.expected_shift.x + self.unshiftable_shift.x;
            window.y += self.layout_extent.y + self.expected_shift.y + self.unshiftable_shift.y;
        }
        window
    }

    pub fn layout_realization_window(&self) -> Rect {
        let mut window = self.layout_visible_window();
        if self.has_scroller {
            let h = self.horizontal_buffer as f32;
            let v = self.vertical_buffer as f32;
            window.x -= h;
            window.y -= v;
            window.width += h * 2.0;
            window.height += v * 2.0;
        }
        window
    }

    pub fn layout_extent(&self) -> Rect {
        self.layout_extent
    }

    pub fn cache_buffers(&self) -> (f64, f64) {
        (self.horizontal_buffer, self.vertical_buffer)
    }

    pub fn cache_lengths(&self) -> (f64, f64) {
        (self.horizontal_cache_length, self.vertical_cache_length)
    }

    pub fn unshiftable_shift(&self) -> Point {
        self.unshiftable_shift
    }

    pub fn made_anchor(&self) -> Option<&E> {
        self.made_anchor.as_ref()
    }

    pub fn is_anchor_outside_realized_range(&self) -> bool {
        self.anchor_outside_realized_range
    }

    pub fn scroller_anchor(&self) -> Option<&E> {
        self.scroller_anchor.as_ref()
    }

    /// Elements currently allowed to serve as scroll anchors.
    pub fn anchor_candidates(&self) -> &[E] {
        &self.anchor_candidates
    }

    pub fn is_managing_disabled(&self) -> bool {
        self.managing_disabled
    }

    pub fn cache_build_outstanding(&self) -> bool {
        self.cache_build_outstanding
    }

    pub fn is_awaiting_layout_updated(&self) -> bool {
        self.awaiting_layout_updated
    }

    pub fn state(&self) -> WindowState {
        WindowState {
            visible_window: self.visible_window,
            realization_window: self.layout_realization_window(),
            layout_extent: self.layout_extent,
            horizontal_cache_buffer: self.horizontal_buffer,
            vertical_cache_buffer: self.vertical_buffer,
            expected_shift: self.expected_shift,
            pending_shift: self.pending_shift,
            unshiftable_shift: self.unshiftable_shift,
        }
    }

    pub(crate) fn set_cache_lengths(
        &mut self,
        horizontal: f64,
        vertical: f64,
    ) -> Result<(), RepeaterError> {
        validate_cache_length(horizontal)?;
        validate_cache_length(vertical)?;
        if self.horizontal_cache_length != horizontal {
            self.horizontal_cache_length = horizontal;
            self.reset_cache_buffer(true);
        }
        if self.vertical_cache_length != vertical {
            self.vertical_cache_length = vertical;
            self.reset_cache_buffer(true);
        }
        Ok(())
    }

    /// Records the extent the layout reported at the end of measure.
    ///
    /// A moved extent origin means the host should scroll by the difference; that expectation is
    /// carried as `expected_shift` until the next arrange.
    pub(crate) fn set_layout_extent(&mut self, extent: Rect) {
        self.expected_shift.x += self.layout_extent.x - extent.x;
        self.expected_shift.y += self.layout_extent.y - extent.y;

        if abs(self.expected_shift.x) > self.shift_tolerance
            || abs(self.expected_shift.y) > self.shift_tolerance
        {
            self.awaiting_layout_updated = true;
        }

        self.layout_extent = extent;
        self.pending_shift = self.expected_shift;
    }

    pub(crate) fn on_layout_changed(&mut self, is_virtualizing: bool) {
        rdebug!(is_virtualizing, "layout changed");
        self.managing_disabled = !is_virtualizing;
        self.layout_extent = Rect::EMPTY;
        self.expected_shift = Point::ZERO;
        self.pending_shift = Point::ZERO;
        self.unshiftable_shift = Point::ZERO;
        self.reset_cache_buffer(true);
    }

    /// The host moved into (or out of) a scrolling ancestor.
    pub(crate) fn on_scroller_changed(&mut self, present: bool) {
        self.has_scroller = present;
        self.scroller_anchor = None;
        self.anchor_outside_realized_range = false;
        self.expected_shift = Point::ZERO;
        self.pending_shift = Point::ZERO;
        self.unshiftable_shift = Point::ZERO;
    }

    pub(crate) fn set_scroller_offset(&mut self, offset: Point) {
        self.scroller_offset = offset;
    }

    pub(crate) fn set_scroller_anchor(&mut self, anchor: Option<E>) {
        self.scroller_anchor = anchor;
    }

    pub(crate) fn on_element_prepared(&mut self, element: &E) {
        if !self.prepared.contains(element) {
            self.prepared.push(element.clone());
        }
    }

    pub(crate) fn on_element_cleared(&mut self, element: &E) {
        self.prepared.retain(|e| e != element);
        self.prepared_and_arranged.retain(|e| e != element);
        self.anchor_candidates.retain(|e| e != element);
    }

    pub(crate) fn on_owner_measuring(&mut self, is_held_by_layout: impl Fn(&E) -> bool) {
        let current = self.layout_realization_window();

        if (self.horizontal_buffer != 0.0 || self.vertical_buffer != 0.0)
            && !self.last_realization_window.intersects(&current)
        {
            rdebug!("realization window jumped, restarting cache growth");
            self.reset_cache_buffer(false);
        }

        self.last_realization_window = current;

        // Elements become anchor candidates one measure after their first arrange.
        for element in core::mem::take(&mut self.prepared_and_arranged) {
            if !self.anchor_candidates.contains(&element) && is_held_by_layout(&element) {
                self.anchor_candidates.push(element);
            }
        }
    }

    pub(crate) fn on_owner_arranged(&mut self, invalidation: &mut Invalidation) {
        for element in core::mem::take(&mut self.prepared) {
            if !self.prepared_and_arranged.contains(&element) {
                self.prepared_and_arranged.push(element);
            }
        }

        self.expected_shift = Point::ZERO;

        if !self.unshiftable_shift.is_zero() {
            let offset = self.scroller_offset;
            if (self.unshiftable_shift.x != 0.0 && abs(self.visible_window.x - offset.x) < 1.0)
                || (self.unshiftable_shift.y != 0.0 && abs(self.visible_window.y - offset.y) < 1.0)
            {
                self.unshiftable_shift = Point::ZERO;
                self.try_invalidate_measure(invalidation);
            }
        }

        if self.managing_disabled || !self.has_scroller {
            return;
        }

        let max_horizontal = self.horizontal_cache_length * self.visible_window.width as f64 / 2.0;
        let max_vertical = self.vertical_cache_length * self.visible_window.height as f64 / 2.0;

        if self.horizontal_buffer < max_horizontal || self.vertical_buffer < max_vertical {
            self.horizontal_buffer = (self.horizontal_buffer + self.inflation).min(max_horizontal);
            self.vertical_buffer = (self.vertical_buffer + self.inflation).min(max_vertical);
            rdebug!(
                horizontal = self.horizontal_buffer,
                vertical = self.vertical_buffer,
                "cache buffer grown"
            );
            self.register_cache_build_work();
        }
    }

    /// The host finished a full layout cycle.
    pub(crate) fn on_layout_updated(&mut self, invalidation: &mut Invalidation) {
        if !self.awaiting_layout_updated {
            return;
        }
        self.awaiting_layout_updated = false;

        if self.managing_disabled {
            return;
        }

        if !self.pending_shift.is_zero() {
            rdebug!(
                x = self.pending_shift.x,
                y = self.pending_shift.y,
                "expected viewport shift never arrived"
            );
            self.unshiftable_shift.x += self.pending_shift.x;
            self.unshiftable_shift.y += self.pending_shift.y;
            self.pending_shift = Point::ZERO;
            self.expected_shift = Point::ZERO;
            self.try_invalidate_measure(invalidation);
        }
    }

    pub(crate) fn on_make_anchor(&mut self, anchor: Option<E>, outside_realized_range: bool) {
        self.made_anchor = anchor;
        self.anchor_outside_realized_range = outside_realized_range;
    }

    /// Returns whether the host may animate the requested scroll.
    pub(crate) fn on_bring_into_view_requested(&mut self, target_child: &E) -> bool {
        if self.managing_disabled {
            return true;
        }
        let animation_desired = !self.anchor_outside_realized_range;
        self.anchor_candidates.retain(|e| e == target_child);
        self.bring_into_view_in_progress = true;
        animation_desired
    }

    pub(crate) fn on_frame_rendered(
        &mut self,
        held_by_layout: impl IntoIterator<Item = E>,
        invalidation: &mut Invalidation,
    ) {
        if !self.bring_into_view_in_progress {
            return;
        }
        self.bring_into_view_in_progress = false;

        if self.made_anchor.take().is_some() && self.anchor_outside_realized_range {
            self.anchor_outside_realized_range = false;
            self.try_invalidate_measure(invalidation);
        }

        for element in held_by_layout {
            if !self.anchor_candidates.contains(&element) {
                self.anchor_candidates.push(element);
            }
        }
    }

    pub(crate) fn on_effective_viewport_changed(
        &mut self,
        viewport: Rect,
        invalidation: &mut Invalidation,
    ) {
        if self.managing_disabled {
            return;
        }

        let invalidated = self.update_viewport(viewport, invalidation);
        let mut invalidate = false;

        if !self.pending_shift.is_zero() {
            self.pending_shift = Point::ZERO;
            invalidate = true;
        }
        if !self.unshiftable_shift.is_zero() {
            self.unshiftable_shift = Point::ZERO;
            invalidate = true;
        }
        if self.visible_window.is_empty() && !self.layout_extent.is_empty() {
            self.layout_extent = Rect::EMPTY;
            invalidate = true;
        }

        if invalidate && !invalidated {
            self.try_invalidate_measure(invalidation);
        }

        self.awaiting_layout_updated = false;
    }

    pub(crate) fn on_cache_build_completed(&mut self, invalidation: &mut Invalidation) {
        self.cache_build_outstanding = false;
        if !self.managing_disabled {
            invalidation.invalidate_measure();
        }
    }

    fn update_viewport(&mut self, viewport: Rect, invalidation: &mut Invalidation) -> bool {
        if -viewport.x <= self.cleared_position.x && -viewport.y <= self.cleared_position.y {
            // The host itself sits where cleared elements are parked.
            self.visible_window = Rect::EMPTY;
            return false;
        }

        let current = self.visible_window;
        if abs(current.x - viewport.x) > VIEWPORT_ROUNDING_TOLERANCE
            || abs(current.y - viewport.y) > VIEWPORT_ROUNDING_TOLERANCE
            || abs(current.width - viewport.width) > VIEWPORT_ROUNDING_TOLERANCE
            || abs(current.height - viewport.height) > VIEWPORT_ROUNDING_TOLERANCE
        {
            self.visible_window = viewport;
            self.try_invalidate_measure(invalidation);
            return true;
        }
        false
    }

    fn reset_cache_buffer(&mut self, register_cache_build_work: bool) {
        self.horizontal_buffer = 0.0;
        self.vertical_buffer = 0.0;
        if register_cache_build_work && !self.managing_disabled {
            self.register_cache_build_work();
        }
    }

    fn register_cache_build_work(&mut self) {
        debug_assert!(!self.managing_disabled);
        self.cache_build_outstanding = true;
    }

    fn try_invalidate_measure(&self, invalidation: &mut Invalidation) {
        if !self.visible_window.is_empty() {
            invalidation.invalidate_measure();
        }
    }
}
