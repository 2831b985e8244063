use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::key::KeyMap;
use crate::{
    ElementFactory, ElementKey, ElementOwner, ItemsSource, Rect, RepeaterError,
    VirtualizationRecord, VisualTree,
};

/// Decides when the phasing loop must hand control back to the frame loop.
pub trait FrameBudget {
    /// Returns `true` once the current frame's time slice is spent.
    fn should_yield(&mut self) -> bool;
}

impl<F: FnMut() -> bool> FrameBudget for F {
    fn should_yield(&mut self) -> bool {
        self()
    }
}

/// Result of one [`crate::Repeater::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Nothing left to bind.
    Idle,
    /// The budget ran out with work still queued; tick again next frame.
    Yielded,
}

pub(crate) fn validate_phase_ordering(current: i32, next: i32) -> Result<(), RepeaterError> {
    if next > 0 && next <= current {
        return Err(RepeaterError::NonMonotonicPhase { current, next });
    }
    Ok(())
}

/// Queue of elements whose data binding still has phases to run.
#[derive(Clone, Debug)]
pub(crate) struct Phaser<E> {
    pending: Vec<E>,
    callback_registered: bool,
}

impl<E> Default for Phaser<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            callback_registered: false,
        }
    }
}

impl<E: ElementKey> Phaser<E> {
    pub(crate) fn is_registered(&self) -> bool {
        self.callback_registered
    }

    pub(crate) fn is_queued(&self, element: &E) -> bool {
        self.pending.contains(element)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Queues `element` if its phase-0 pass asked for more.
    pub(crate) fn phase_element<D>(&mut self, element: &E, record: &VirtualizationRecord<D>) {
        if record.phase() > 0 && record.has_phasing_data() {
            debug_assert!(!self.pending.contains(element));
            self.pending.push(element.clone());
            self.callback_registered = true;
        }
    }

    pub(crate) fn stop_phasing<D>(&mut self, element: &E, record: &mut VirtualizationRecord<D>) {
        if record.has_phasing_data() {
            self.pending.retain(|e| e != element);
        }
        record.clear_phasing();
    }

    /// Runs queued binding phases until the queue drains or `budget` says to yield.
    ///
    /// Elements intersecting `visible_window` go first, lowest phase first; everything else
    /// follows in the same phase order.
    pub(crate) fn do_phased_work<D>(
        &mut self,
        records: &mut KeyMap<E, VirtualizationRecord<D>>,
        source: Option<&Rc<dyn ItemsSource<D>>>,
        factory: &dyn ElementFactory<E, D>,
        tree: &mut dyn VisualTree<E>,
        visible_window: Rect,
        budget: &mut dyn FrameBudget,
    ) -> Result<PhaseOutcome, RepeaterError> {
        self.callback_registered = false;

        if !self.pending.is_empty() && !budget.should_yield() {
            self.sort(records, visible_window);

            // The best candidate sits at the back; `cursor` is one past it.
            let mut cursor = self.pending.len();
            while cursor > 0 {
                let slot = cursor - 1;
                let element = self.pending[slot].clone();
                let next_phase = {
                    let record = records
                        .get_mut(&element)
                        .ok_or(RepeaterError::UnknownElement)?;
                    if record.owner() == ElementOwner::Unrealized {
                        return Err(RepeaterError::ClearedElementQueued);
                    }
                    let index = record.index();
                    let binding = record
                        .binding()
                        .or_else(|| factory.binding_component(&element))
                        .ok_or_else(|| {
                            RepeaterError::Collaborator(
                                "binding component dropped while phasing".to_string(),
                            )
                        })?;
                    let data = match record.data() {
                        Some(data) => data,
                        None => {
                            let source = source.ok_or(RepeaterError::NoItemsSource)?;
                            let index = index.ok_or(RepeaterError::ClearedElementQueued)?;
                            source.get_at(index)
                        }
                    };

                    let current_phase = record.phase();
                    let next_phase = binding.process_bindings(&data, index, current_phase)?;
                    validate_phase_ordering(current_phase, next_phase)?;
                    rtrace!(?element, current_phase, next_phase, "phase processed");

                    tree.measure(&element, record.measure_size);
                    if next_phase > 0 {
                        record.set_phase(next_phase);
                    } else {
                        record.update_phasing_info(next_phase, None, None);
                    }
                    next_phase
                };

                if next_phase > 0 {
                    // Stay on this entry until it no longer outranks the one before it.
                    let outranked = slot == 0
                        || records
                            .get(&self.pending[slot - 1])
                            .is_some_and(|prev| next_phase > prev.phase());
                    if outranked {
                        cursor -= 1;
                    }
                } else {
                    self.pending.remove(slot);
                    cursor -= 1;
                }

                if budget.should_yield() {
                    break;
                }
            }
        }

        if self.pending.is_empty() {
            Ok(PhaseOutcome::Idle)
        } else {
            self.callback_registered = true;
            Ok(PhaseOutcome::Yielded)
        }
    }

    fn sort<D>(&mut self, records: &KeyMap<E, VirtualizationRecord<D>>, visible_window: Rect) {
        let rank = |element: &E| {
            records
                .get(element)
                .map(|r| (r.arrange_bounds().intersects(&visible_window), r.phase()))
                .unwrap_or((false, i32::MIN))
        };
        // Ascending by visibility, descending by phase: the back holds the visible, lowest phase.
        self.pending.sort_by(|a, b| {
            let (a_visible, a_phase) = rank(a);
            let (b_visible, b_phase) = rank(b);
            a_visible.cmp(&b_visible).then(b_phase.cmp(&a_phase))
        });
    }
}
