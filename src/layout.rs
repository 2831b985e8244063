use alloc::boxed::Box;
use core::any::Any;

use crate::{CollectionChange, Point, Rect, RepeaterError, Size};

bitflags::bitflags! {
    /// Flags for [`LayoutContext::get_or_create_element_at`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ElementRealizationOptions: u8 {
        /// Skip the already-held fast path and realize a fresh element.
        const FORCE_CREATE = 0b0000_0001;
        /// The layout recycles this element itself; never auto-recycle it after measure.
        const SUPPRESS_AUTO_RECYCLE = 0b0000_0010;
    }
}

/// What a layout can ask of the host during measure, arrange, and item-change callbacks.
pub trait LayoutContext<E> {
    fn item_count(&self) -> usize;

    /// Returns an element for `index`, always held by the layout when this returns.
    fn get_or_create_element_at(
        &mut self,
        index: usize,
        options: ElementRealizationOptions,
    ) -> Result<E, RepeaterError>;

    /// Hands an element the layout no longer needs back to the host.
    fn recycle_element(&mut self, element: &E) -> Result<(), RepeaterError>;

    /// Visible window expanded by the current cache buffer.
    fn realization_rect(&self) -> Rect;

    fn visible_rect(&self) -> Rect;

    /// Index the layout should keep stable across a viewport jump, if any.
    fn recommended_anchor_index(&self) -> Option<usize>;

    fn layout_origin(&self) -> Point;

    fn set_layout_origin(&mut self, origin: Point);

    fn layout_state(&self) -> Option<&dyn Any>;

    fn layout_state_mut(&mut self) -> Option<&mut dyn Any>;

    fn set_layout_state(&mut self, state: Option<Box<dyn Any>>);

    /// Measures a realized element and returns its desired size.
    fn measure_element(&mut self, element: &E, available: Size) -> Result<Size, RepeaterError>;

    /// Places a realized element in its final slot.
    fn arrange_element(&mut self, element: &E, bounds: Rect) -> Result<(), RepeaterError>;
}

/// The geometric strategy that decides which indices to realize and where they go.
pub trait Layout<E> {
    /// Non-virtualizing layouts realize everything and get no viewport management.
    fn is_virtualizing(&self) -> bool {
        true
    }

    fn initialize(&mut self, _context: &mut dyn LayoutContext<E>) -> Result<(), RepeaterError> {
        Ok(())
    }

    fn uninitialize(&mut self, _context: &mut dyn LayoutContext<E>) -> Result<(), RepeaterError> {
        Ok(())
    }

    fn measure(
        &mut self,
        context: &mut dyn LayoutContext<E>,
        available: Size,
    ) -> Result<Size, RepeaterError>;

    fn arrange(
        &mut self,
        context: &mut dyn LayoutContext<E>,
        final_size: Size,
    ) -> Result<Size, RepeaterError>;

    /// Called for every collection change while the host is still processing it.
    fn on_items_changed(
        &mut self,
        _context: &mut dyn LayoutContext<E>,
        _change: &CollectionChange,
    ) -> Result<(), RepeaterError> {
        Ok(())
    }
}
