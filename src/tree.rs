use crate::{FocusState, Rect, Size};

/// The rendering tree the repeater's elements live in.
///
/// Only the handful of queries the lifecycle core needs: ancestry, measure/arrange, and focus.
pub trait VisualTree<E> {
    /// Parent of `element`, or `None` for a direct child of the host (or a detached element).
    fn parent(&self, element: &E) -> Option<E>;

    /// Measures `element` under `available` and returns its desired size.
    fn measure(&mut self, element: &E, available: Size) -> Size;

    fn arrange(&mut self, _element: &E, _bounds: Rect) {}

    /// The element that currently holds focus anywhere in the tree.
    fn focused_element(&self) -> Option<E> {
        None
    }

    fn focus_state(&self, _element: &E) -> FocusState {
        FocusState::Unfocused
    }

    /// Whether `element` can take focus itself (as opposed to through a descendant).
    fn is_focusable(&self, _element: &E) -> bool {
        true
    }

    fn first_focusable_descendant(&self, _element: &E) -> Option<E> {
        None
    }

    fn last_focusable_descendant(&self, _element: &E) -> Option<E> {
        None
    }

    /// Moves focus to `element` without activating its window. Returns whether focus moved.
    fn focus_without_activation(&mut self, element: &E, state: FocusState) -> bool;
}
