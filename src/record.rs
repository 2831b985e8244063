use alloc::rc::{Rc, Weak};
use alloc::string::String;

use crate::{
    BindingComponent, ElementOwner, PHASE_NOT_SPECIFIED, Rect, RepeaterError, Size,
};

/// Per-element bookkeeping for as long as the repeater knows the element.
///
/// Ownership only moves through the guarded `move_*` methods; each one rejects an illegal source
/// state with [`RepeaterError::InvalidTransition`].
pub struct VirtualizationRecord<D> {
    owner: ElementOwner,
    index: Option<usize>,
    stable_key: Option<String>,
    pin_count: u32,
    pub(crate) arrange_bounds: Rect,
    /// Constraint the element was last measured with; phasing re-measures under it.
    pub(crate) measure_size: Size,
    phase: i32,
    pub(crate) keep_alive: bool,
    pub(crate) auto_recycle_candidate: bool,
    pub(crate) must_clear_data_context: bool,
    data: Option<Weak<D>>,
    binding: Option<Weak<dyn BindingComponent<D>>>,
}

impl<D> VirtualizationRecord<D> {
    pub(crate) fn new() -> Self {
        Self {
            owner: ElementOwner::Unrealized,
            index: None,
            stable_key: None,
            pin_count: 0,
            arrange_bounds: Rect::INVALID,
            measure_size: Size::ZERO,
            phase: PHASE_NOT_SPECIFIED,
            keep_alive: false,
            auto_recycle_candidate: false,
            must_clear_data_context: false,
            data: None,
            binding: None,
        }
    }

    pub fn owner(&self) -> ElementOwner {
        self.owner
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn stable_key(&self) -> Option<&str> {
        self.stable_key.as_deref()
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    pub fn is_realized(&self) -> bool {
        self.owner.is_realized()
    }

    pub fn is_held_by_layout(&self) -> bool {
        self.owner == ElementOwner::Active
    }

    pub fn arrange_bounds(&self) -> Rect {
        self.arrange_bounds
    }

    pub fn phase(&self) -> i32 {
        self.phase
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn auto_recycle_candidate(&self) -> bool {
        self.auto_recycle_candidate
    }

    fn guard(&self, allowed: bool, to: ElementOwner) -> Result<(), RepeaterError> {
        if allowed {
            Ok(())
        } else {
            Err(RepeaterError::InvalidTransition {
                from: self.owner,
                to,
            })
        }
    }

    pub(crate) fn move_to_layout_from_factory(
        &mut self,
        index: usize,
        stable_key: Option<String>,
    ) -> Result<(), RepeaterError> {
        self.guard(self.owner == ElementOwner::Unrealized, ElementOwner::Active)?;
        self.owner = ElementOwner::Active;
        self.index = Some(index);
        self.stable_key = stable_key;
        Ok(())
    }

    pub(crate) fn move_to_layout_from_reset_pool(&mut self) -> Result<(), RepeaterError> {
        self.guard(
            self.owner == ElementOwner::StableKeyPending,
            ElementOwner::Active,
        )?;
        self.owner = ElementOwner::Active;
        Ok(())
    }

    pub(crate) fn move_to_layout_from_pinned_pool(&mut self) -> Result<(), RepeaterError> {
        self.guard(
            self.owner == ElementOwner::Pinned && self.pin_count > 0,
            ElementOwner::Active,
        )?;
        self.owner = ElementOwner::Active;
        Ok(())
    }

    /// Hard release. Legal from every owner except `Unrealized` itself.
    pub(crate) fn move_to_factory(&mut self) -> Result<(), RepeaterError> {
        self.guard(
            self.owner != ElementOwner::Unrealized,
            ElementOwner::Unrealized,
        )?;
        self.owner = ElementOwner::Unrealized;
        self.index = None;
        self.stable_key = None;
        self.pin_count = 0;
        self.arrange_bounds = Rect::INVALID;
        self.keep_alive = false;
        self.auto_recycle_candidate = false;
        Ok(())
    }

    pub(crate) fn move_to_reset_pool(&mut self) -> Result<(), RepeaterError> {
        self.guard(
            self.owner == ElementOwner::Active,
            ElementOwner::StableKeyPending,
        )?;
        self.owner = ElementOwner::StableKeyPending;
        Ok(())
    }

    pub(crate) fn move_to_animator(&mut self) -> Result<(), RepeaterError> {
        self.guard(
            matches!(
                self.owner,
                ElementOwner::Active | ElementOwner::StableKeyPending
            ),
            ElementOwner::ExitAnimating,
        )?;
        self.owner = ElementOwner::ExitAnimating;
        self.index = None;
        self.pin_count = 0;
        Ok(())
    }

    pub(crate) fn move_to_pinned_pool(&mut self) -> Result<(), RepeaterError> {
        self.guard(
            self.owner == ElementOwner::Active && self.pin_count > 0,
            ElementOwner::Pinned,
        )?;
        self.owner = ElementOwner::Pinned;
        Ok(())
    }

    pub(crate) fn add_pin(&mut self) -> Result<u32, RepeaterError> {
        if !self.is_realized() {
            return Err(RepeaterError::PinUnrealized);
        }
        self.pin_count += 1;
        Ok(self.pin_count)
    }

    pub(crate) fn remove_pin(&mut self) -> Result<u32, RepeaterError> {
        if !self.is_realized() {
            return Err(RepeaterError::UnpinUnrealized);
        }
        if self.pin_count == 0 {
            return Err(RepeaterError::PinImbalance);
        }
        self.pin_count -= 1;
        Ok(self.pin_count)
    }

    pub(crate) fn update_index(&mut self, index: usize) {
        debug_assert!(
            matches!(
                self.owner,
                ElementOwner::Active | ElementOwner::Pinned | ElementOwner::StableKeyPending
            ),
            "index updated while {:?}",
            self.owner
        );
        self.index = Some(index);
    }

    pub(crate) fn set_phase(&mut self, phase: i32) {
        self.phase = phase;
    }

    pub(crate) fn update_phasing_info(
        &mut self,
        phase: i32,
        data: Option<&Rc<D>>,
        binding: Option<&Rc<dyn BindingComponent<D>>>,
    ) {
        self.phase = phase;
        self.data = data.map(Rc::downgrade);
        self.binding = binding.map(Rc::downgrade);
    }

    pub(crate) fn clear_phasing(&mut self) {
        self.update_phasing_info(PHASE_NOT_SPECIFIED, None, None);
    }

    /// Whether phasing state was attached, regardless of whether the referents are still alive.
    pub(crate) fn has_phasing_data(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn data(&self) -> Option<Rc<D>> {
        self.data.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn binding(&self) -> Option<Rc<dyn BindingComponent<D>>> {
        self.binding.as_ref().and_then(Weak::upgrade)
    }
}

impl<D> core::fmt::Debug for VirtualizationRecord<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtualizationRecord")
            .field("owner", &self.owner)
            .field("index", &self.index)
            .field("stable_key", &self.stable_key)
            .field("pin_count", &self.pin_count)
            .field("arrange_bounds", &self.arrange_bounds)
            .field("phase", &self.phase)
            .field("keep_alive", &self.keep_alive)
            .field("auto_recycle_candidate", &self.auto_recycle_candidate)
            .finish_non_exhaustive()
    }
}
