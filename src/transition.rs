use alloc::boxed::Box;

use crate::{CollectionChangeKind, Rect, RepeaterError};

bitflags::bitflags! {
    /// What happened during the current frame that might deserve an item transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TransitionTriggers: u8 {
        const ADD = 0b0000_0001;
        const REMOVE = 0b0000_0010;
        const RESET = 0b0000_0100;
        const LAYOUT = 0b0000_1000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransitionOperation {
    /// An element entered realization.
    Show,
    /// An element is leaving; the repeater holds it until the animator reports completion.
    Hide,
    /// An element's arranged bounds changed.
    Move,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemTransition<E> {
    pub element: E,
    pub triggers: TransitionTriggers,
    pub operation: TransitionOperation,
    pub old_bounds: Option<Rect>,
    pub new_bounds: Option<Rect>,
}

/// Plays item transitions on behalf of the repeater.
///
/// Accepting a `Hide` defers the element's release until
/// [`crate::Repeater::on_transition_completed`] is called for it.
pub trait ElementAnimator<E> {
    fn should_animate(&mut self, transition: &ItemTransition<E>) -> Result<bool, RepeaterError>;

    fn queue_transition(&mut self, transition: ItemTransition<E>) -> Result<(), RepeaterError>;
}

/// Queues `transition` if the animator wants it. Returns whether it was queued.
fn offer<E>(
    animator: &mut dyn ElementAnimator<E>,
    transition: ItemTransition<E>,
) -> Result<bool, RepeaterError> {
    if !animator.should_animate(&transition)? {
        return Ok(false);
    }
    animator.queue_transition(transition)?;
    Ok(true)
}

/// Infers transition triggers from the signals seen during a frame and forwards transitions to
/// the attached animator.
///
/// Triggers accumulate across a frame and reset once the host finishes arranging.
pub(crate) struct TransitionCoordinator<E> {
    animator: Option<Box<dyn ElementAnimator<E>>>,
    recorded: TransitionTriggers,
}

impl<E> Default for TransitionCoordinator<E> {
    fn default() -> Self {
        Self {
            animator: None,
            recorded: TransitionTriggers::empty(),
        }
    }
}

impl<E: Clone> TransitionCoordinator<E> {
    pub(crate) fn set_animator(&mut self, animator: Option<Box<dyn ElementAnimator<E>>>) {
        self.animator = animator;
    }

    pub(crate) fn has_animator(&self) -> bool {
        self.animator.is_some()
    }

    pub(crate) fn recorded(&self) -> TransitionTriggers {
        self.recorded
    }

    pub(crate) fn on_items_changed(&mut self, kind: CollectionChangeKind) {
        self.recorded |= match kind {
            CollectionChangeKind::Add => TransitionTriggers::ADD,
            CollectionChangeKind::Remove => TransitionTriggers::REMOVE,
            CollectionChangeKind::Replace => TransitionTriggers::ADD | TransitionTriggers::REMOVE,
            CollectionChangeKind::Reset => TransitionTriggers::RESET,
        };
    }

    pub(crate) fn on_layout_changing(&mut self) {
        self.recorded |= TransitionTriggers::LAYOUT;
    }

    pub(crate) fn on_element_prepared(&mut self, element: &E) -> Result<(), RepeaterError> {
        let Some(animator) = self.animator.as_mut() else {
            return Ok(());
        };
        let triggers = self.recorded & (TransitionTriggers::ADD | TransitionTriggers::RESET);
        if triggers.is_empty() {
            return Ok(());
        }
        offer(
            &mut **animator,
            ItemTransition {
                element: element.clone(),
                triggers,
                operation: TransitionOperation::Show,
                old_bounds: None,
                new_bounds: None,
            },
        )?;
        Ok(())
    }

    /// Offers `element` to the animator for an exit animation. Returns whether it was taken.
    pub(crate) fn clear_element(&mut self, element: &E) -> Result<bool, RepeaterError> {
        let Some(animator) = self.animator.as_mut() else {
            return Ok(false);
        };
        let triggers = self.recorded & (TransitionTriggers::REMOVE | TransitionTriggers::RESET);
        if triggers.is_empty() {
            return Ok(false);
        }
        offer(
            &mut **animator,
            ItemTransition {
                element: element.clone(),
                triggers,
                operation: TransitionOperation::Hide,
                old_bounds: None,
                new_bounds: None,
            },
        )
    }

    pub(crate) fn on_element_bounds_changed(
        &mut self,
        element: &E,
        old_bounds: Rect,
        new_bounds: Rect,
    ) -> Result<(), RepeaterError> {
        let Some(animator) = self.animator.as_mut() else {
            return Ok(());
        };
        // A bounds change with nothing recorded (first layout, host resize) still counts as a
        // layout move.
        let triggers = if self.recorded.is_empty() {
            TransitionTriggers::LAYOUT
        } else {
            self.recorded
        };
        offer(
            &mut **animator,
            ItemTransition {
                element: element.clone(),
                triggers,
                operation: TransitionOperation::Move,
                old_bounds: Some(old_bounds),
                new_bounds: Some(new_bounds),
            },
        )?;
        Ok(())
    }

    pub(crate) fn on_owner_arranged(&mut self) {
        self.recorded = TransitionTriggers::empty();
    }
}
