use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::key::KeyMap;
use crate::phaser::{Phaser, validate_phase_ordering};
use crate::transition::TransitionCoordinator;
use crate::types::Invalidation;
use crate::{
    CollectionChange, CollectionChangeKind, ElementFactory, ElementKey, ElementOwner, FocusState,
    FrameBudget, IndexBounds, ItemsSource, PhaseOutcome, PinnedPool, Rect, RepeaterError,
    RepeaterOptions, Size, StableKeyResetPool, ViewportTracker, VirtualizationRecord, VisualTree,
};

/// Everything outside the view manager that element acquisition and release touch.
pub(crate) struct HostServices<E, D> {
    pub(crate) source: Option<Rc<dyn ItemsSource<D>>>,
    pub(crate) factory: Box<dyn ElementFactory<E, D>>,
    pub(crate) tree: Box<dyn VisualTree<E>>,
    pub(crate) transitions: TransitionCoordinator<E>,
    pub(crate) viewport: ViewportTracker<E>,
    pub(crate) options: RepeaterOptions<E>,
    pub(crate) invalidation: Invalidation,
    pub(crate) processing_change: Option<CollectionChange>,
}

impl<E, D> HostServices<E, D> {
    /// Clears during a structural collection change bypass the pinned pool.
    fn clearing_due_to_collection_change(&self) -> bool {
        self.processing_change
            .as_ref()
            .is_some_and(CollectionChange::is_structural)
    }
}

fn include_index(bounds: &mut Option<IndexBounds>, index: usize) {
    *bounds = Some(match *bounds {
        None => IndexBounds {
            first: index,
            last: index,
        },
        Some(b) => IndexBounds {
            first: b.first.min(index),
            last: b.last.max(index),
        },
    });
}

/// Owns every element record and the pools elements move between.
///
/// Acquisition tries, in order: an element the layout already holds, the pending made anchor,
/// the stable-key reset pool, the pinned pool, and finally the factory. Release tries the reset
/// pool, the exit animator, the pinned pool, and finally the factory.
pub(crate) struct ViewManager<E: ElementKey, D> {
    records: KeyMap<E, VirtualizationRecord<D>>,
    /// Every element this host has seen, in first-realization order.
    children: Vec<E>,
    reset_pool: StableKeyResetPool<E>,
    pinned_pool: PinnedPool<E>,
    phaser: Phaser<E>,
    last_focused: Option<E>,
    realized_bounds: Option<IndexBounds>,
    stable_reset_pending: bool,
}

impl<E: ElementKey, D> Default for ViewManager<E, D> {
    fn default() -> Self {
        Self {
            records: KeyMap::new(),
            children: Vec::new(),
            reset_pool: StableKeyResetPool::new(),
            pinned_pool: PinnedPool::default(),
            phaser: Phaser::default(),
            last_focused: None,
            realized_bounds: None,
            stable_reset_pending: false,
        }
    }
}

impl<E: ElementKey, D> ViewManager<E, D> {
    pub(crate) fn record(&self, element: &E) -> Option<&VirtualizationRecord<D>> {
        self.records.get(element)
    }

    fn record_mut_or_err(
        &mut self,
        element: &E,
    ) -> Result<&mut VirtualizationRecord<D>, RepeaterError> {
        self.records
            .get_mut(element)
            .ok_or(RepeaterError::UnknownElement)
    }

    pub(crate) fn children(&self) -> &[E] {
        &self.children
    }

    pub(crate) fn realized_bounds(&self) -> Option<IndexBounds> {
        self.realized_bounds
    }

    pub(crate) fn is_stable_reset_pending(&self) -> bool {
        self.stable_reset_pending
    }

    pub(crate) fn reset_pool(&self) -> &StableKeyResetPool<E> {
        &self.reset_pool
    }

    pub(crate) fn pinned_pool(&self) -> &PinnedPool<E> {
        &self.pinned_pool
    }

    pub(crate) fn last_focused(&self) -> Option<&E> {
        self.last_focused.as_ref()
    }

    pub(crate) fn phaser(&self) -> &Phaser<E> {
        &self.phaser
    }

    pub(crate) fn held_by_layout(&self) -> Vec<E> {
        self.children
            .iter()
            .filter(|c| self.records.get(*c).is_some_and(|r| r.is_held_by_layout()))
            .cloned()
            .collect()
    }

    pub(crate) fn is_held_by_layout(&self, element: &E) -> bool {
        self.records
            .get(element)
            .is_some_and(|r| r.is_held_by_layout())
    }

    /// Index of a realized or reset-pooled element; `None` for anything else.
    pub(crate) fn element_index(&self, element: &E) -> Option<usize> {
        let record = self.records.get(element)?;
        match record.owner() {
            ElementOwner::Active | ElementOwner::Pinned | ElementOwner::StableKeyPending => {
                record.index()
            }
            ElementOwner::Unrealized | ElementOwner::ExitAnimating => None,
        }
    }

    pub(crate) fn try_get_element(&self, index: usize) -> Option<E> {
        self.children
            .iter()
            .find(|c| {
                self.records
                    .get(*c)
                    .is_some_and(|r| r.is_realized() && r.index() == Some(index))
            })
            .cloned()
    }

    /// Walks up from `element` to the direct child of this host that contains it.
    pub(crate) fn immediate_child(&self, element: &E, tree: &dyn VisualTree<E>) -> Option<E> {
        let mut current = element.clone();
        loop {
            if self.records.contains_key(&current) {
                return Some(current);
            }
            current = tree.parent(&current)?;
        }
    }

    pub(crate) fn get_element(
        &mut self,
        index: usize,
        force_create: bool,
        suppress_auto_recycle: bool,
        host: &mut HostServices<E, D>,
    ) -> Result<E, RepeaterError> {
        let mut element = if force_create {
            None
        } else {
            self.element_if_held_by_layout(index)
        };

        let mut element_is_anchor = false;
        if element.is_none() {
            if let Some(anchor) = host.viewport.made_anchor() {
                let usable = self.records.get(anchor).is_some_and(|r| {
                    r.index() == Some(index)
                        && (r.is_held_by_layout()
                            || (r.owner() == ElementOwner::Pinned && r.is_pinned()))
                });
                if usable {
                    element = Some(anchor.clone());
                    element_is_anchor = true;
                }
            }
        }

        if element.is_none() {
            element = self.element_from_reset_pool(index, host)?;
        }

        if element.is_none() || element_is_anchor {
            // A made anchor may also sit in the pinned pool (it held focus, say); pull it out.
            let from_pool = self.element_from_pinned_pool(index)?;
            debug_assert!(from_pool.is_none() || element.is_none() || from_pool == element);
            if element.is_none() {
                element = from_pool;
            }
        }

        let element = match element {
            Some(element) => element,
            None => self.element_from_factory(index, host)?,
        };

        let record = self.record_mut_or_err(&element)?;
        if suppress_auto_recycle {
            record.auto_recycle_candidate = false;
        } else {
            record.auto_recycle_candidate = true;
            record.keep_alive = true;
        }
        debug_assert_eq!(record.owner(), ElementOwner::Active);
        Ok(element)
    }

    /// Fast path for layouts that ask again for an index they already hold.
    fn element_if_held_by_layout(&mut self, index: usize) -> Option<E> {
        let cache_invalid = self.realized_bounds.is_none();
        if let Some(bounds) = self.realized_bounds {
            if !bounds.contains(index) {
                return None;
            }
        }

        let mut found = None;
        for child in &self.children {
            let Some(record) = self.records.get(child) else {
                continue;
            };
            if !record.is_held_by_layout() {
                continue;
            }
            let Some(child_index) = record.index() else {
                continue;
            };
            include_index(&mut self.realized_bounds, child_index);
            if child_index == index {
                found = Some(child.clone());
                // With a stale cache keep walking so the bounds come out exact.
                if !cache_invalid {
                    break;
                }
            }
        }
        found
    }

    fn element_from_reset_pool(
        &mut self,
        index: usize,
        host: &mut HostServices<E, D>,
    ) -> Result<Option<E>, RepeaterError> {
        if !self.stable_reset_pending {
            return Ok(None);
        }
        let Some(key) = host.source.as_ref().and_then(|s| s.key_from_index(index)) else {
            return Ok(None);
        };
        let Some(element) = self.reset_pool.remove(&key) else {
            return Ok(None);
        };

        self.record_mut_or_err(&element)?
            .move_to_layout_from_reset_pool()?;
        self.update_element_index(&element, index, host);
        include_index(&mut self.realized_bounds, index);
        rtrace!(?element, index, "reclaimed from reset pool");
        Ok(Some(element))
    }

    fn element_from_pinned_pool(&mut self, index: usize) -> Result<Option<E>, RepeaterError> {
        let records = &self.records;
        let Some(element) = self.pinned_pool.take_first(|e| {
            records
                .get(e)
                .is_some_and(|r| r.index() == Some(index) && r.is_pinned())
        }) else {
            return Ok(None);
        };

        self.record_mut_or_err(&element)?
            .move_to_layout_from_pinned_pool()?;
        include_index(&mut self.realized_bounds, index);
        rtrace!(?element, index, "reclaimed from pinned pool");
        Ok(Some(element))
    }

    fn element_from_factory(
        &mut self,
        index: usize,
        host: &mut HostServices<E, D>,
    ) -> Result<E, RepeaterError> {
        let source = host.source.clone().ok_or(RepeaterError::NoItemsSource)?;
        let data = source.get_at(index);
        let element = host.factory.get_element(&data, index)?;

        let is_new = !self.records.contains_key(&element);
        let record = self
            .records
            .entry(element.clone())
            .or_insert_with(VirtualizationRecord::new);
        record.must_clear_data_context = false;

        if let Some(binding) = host.factory.binding_component(&element) {
            // Phase 0 runs before anything else sees the element.
            binding.recycle();
            let bound = binding
                .process_bindings(&data, Some(index), 0)
                .and_then(|phase| validate_phase_ordering(0, phase).map(|()| phase));
            let next_phase = match bound {
                Ok(phase) => phase,
                Err(err) => {
                    if is_new {
                        self.records.remove(&element);
                    }
                    host.factory.recycle_element(element);
                    return Err(err);
                }
            };
            if next_phase > 0 {
                record.update_phasing_info(next_phase, Some(&data), Some(&binding));
            } else {
                record.update_phasing_info(next_phase, None, None);
            }
        } else {
            host.factory.set_data_context(&element, Some(Rc::clone(&data)));
            record.must_clear_data_context = true;
        }

        let stable_key = if source.has_stable_keys() {
            source.key_from_index(index)
        } else {
            None
        };
        record.move_to_layout_from_factory(index, stable_key)?;

        if is_new {
            self.children.push(element.clone());
        }

        host.transitions.on_element_prepared(&element)?;
        host.viewport.on_element_prepared(&element);
        host.options.notify_prepared(&element, index);

        if let Some(record) = self.records.get(&element) {
            self.phaser.phase_element(&element, record);
        }
        include_index(&mut self.realized_bounds, index);
        rtrace!(?element, index, is_new, "realized from factory");
        Ok(element)
    }

    /// Clears on behalf of the host: infers whether a structural change is in flight and drops
    /// the element from scroll-anchor bookkeeping.
    pub(crate) fn clear_from_host(
        &mut self,
        element: &E,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let due_to_collection_change = host.clearing_due_to_collection_change();
        self.clear_element(element, due_to_collection_change, host)?;
        host.viewport.on_element_cleared(element);
        Ok(())
    }

    pub(crate) fn clear_element(
        &mut self,
        element: &E,
        due_to_collection_change: bool,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let record = self
            .records
            .get(element)
            .ok_or(RepeaterError::UnknownElement)?;
        let owner = record.owner();
        let index = record.index();

        match owner {
            ElementOwner::Unrealized | ElementOwner::ExitAnimating => {
                return Err(RepeaterError::InvalidTransition {
                    from: owner,
                    to: ElementOwner::Unrealized,
                });
            }
            ElementOwner::Pinned => {
                if !due_to_collection_change && record.is_pinned() {
                    return Ok(());
                }
                self.pinned_pool.remove(element);
                self.clear_element_to_factory(element, host)?;
            }
            ElementOwner::Active | ElementOwner::StableKeyPending => {
                let cleared = self.clear_element_to_reset_pool(element)?
                    || self.clear_element_to_animator(element, host)?
                    || self.clear_element_to_pinned_pool(element, due_to_collection_change)?;
                if !cleared {
                    self.clear_element_to_factory(element, host)?;
                }
            }
        }

        self.shrink_realized_bounds(index);
        Ok(())
    }

    fn shrink_realized_bounds(&mut self, index: Option<usize>) {
        let (Some(index), Some(bounds)) = (index, self.realized_bounds) else {
            return;
        };
        if index == bounds.first && index == bounds.last {
            self.realized_bounds = None;
        } else if index == bounds.first {
            self.realized_bounds = Some(IndexBounds {
                first: bounds.first + 1,
                last: bounds.last,
            });
        } else if index == bounds.last {
            self.realized_bounds = Some(IndexBounds {
                first: bounds.first,
                last: bounds.last - 1,
            });
        }
    }

    fn clear_element_to_reset_pool(&mut self, element: &E) -> Result<bool, RepeaterError> {
        if !self.stable_reset_pending {
            return Ok(false);
        }
        let record = self
            .records
            .get(element)
            .ok_or(RepeaterError::UnknownElement)?;
        let Some(key) = record.stable_key().map(String::from) else {
            return Ok(false);
        };
        // The pool rejects duplicate keys before the record changes owner.
        self.reset_pool.add(key.clone(), element.clone())?;
        if let Err(err) = self
            .record_mut_or_err(element)
            .and_then(|record| record.move_to_reset_pool())
        {
            self.reset_pool.remove(&key);
            return Err(err);
        }
        rtrace!(?element, "parked in reset pool");
        Ok(true)
    }

    fn clear_element_to_animator(
        &mut self,
        element: &E,
        host: &mut HostServices<E, D>,
    ) -> Result<bool, RepeaterError> {
        if !host.transitions.clear_element(element)? {
            return Ok(false);
        }

        let record = self
            .records
            .get_mut(element)
            .ok_or(RepeaterError::UnknownElement)?;
        let cleared_index = record.index();
        record.move_to_animator()?;
        self.phaser.stop_phasing(element, record);
        rtrace!(?element, "handed to exit animator");

        if self.last_focused.as_ref() == Some(element) {
            self.move_focus_from_cleared_index(cleared_index, host)?;
        }
        Ok(true)
    }

    fn clear_element_to_pinned_pool(
        &mut self,
        element: &E,
        due_to_collection_change: bool,
    ) -> Result<bool, RepeaterError> {
        let record = self.record_mut_or_err(element)?;
        if due_to_collection_change || !record.is_pinned() {
            return Ok(false);
        }
        record.move_to_pinned_pool()?;
        self.pinned_pool.push(element.clone());
        rtrace!(?element, "parked in pinned pool");
        Ok(true)
    }

    /// Hard release back to the factory.
    pub(crate) fn clear_element_to_factory(
        &mut self,
        element: &E,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        host.options.notify_clearing(element);

        let record = self
            .records
            .get_mut(element)
            .ok_or(RepeaterError::UnknownElement)?;
        let cleared_index = record.index();
        record.move_to_factory()?;

        if record.must_clear_data_context {
            record.must_clear_data_context = false;
            host.factory.set_data_context(element, None);
        }

        self.phaser.stop_phasing(element, record);
        host.factory.recycle_element(element.clone());
        rtrace!(?element, ?cleared_index, "released to factory");

        if self.last_focused.as_ref() == Some(element) {
            self.move_focus_from_cleared_index(cleared_index, host)?;
        }
        Ok(())
    }

    /// Hard-releases every realized element, as when the data source is replaced wholesale.
    pub(crate) fn release_all_realized(
        &mut self,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        for child in self.children.clone() {
            if !self.records.get(&child).is_some_and(|r| r.is_realized()) {
                continue;
            }
            self.pinned_pool.remove(&child);
            self.clear_element_to_factory(&child, host)?;
            host.viewport.on_element_cleared(&child);
        }
        self.realized_bounds = None;
        Ok(())
    }

    /// Completes a `Hide` transition by releasing the element for good.
    pub(crate) fn finish_exit_animation(
        &mut self,
        element: &E,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let owner = self
            .records
            .get(element)
            .ok_or(RepeaterError::UnknownElement)?
            .owner();
        if owner != ElementOwner::ExitAnimating {
            return Err(RepeaterError::InvalidTransition {
                from: owner,
                to: ElementOwner::Unrealized,
            });
        }
        self.clear_element_to_factory(element, host)?;
        host.viewport.on_element_cleared(element);
        host.invalidation.invalidate_arrange();
        Ok(())
    }

    /// Drops the record of an element the factory discarded for good.
    pub(crate) fn forget_element(&mut self, element: &E) -> Result<(), RepeaterError> {
        let owner = self
            .records
            .get(element)
            .ok_or(RepeaterError::UnknownElement)?
            .owner();
        if owner != ElementOwner::Unrealized {
            return Err(RepeaterError::InvalidTransition {
                from: owner,
                to: ElementOwner::Unrealized,
            });
        }
        self.records.remove(element);
        self.children.retain(|c| c != element);
        if self.last_focused.as_ref() == Some(element) {
            self.last_focused = None;
        }
        Ok(())
    }

    fn move_focus_from_cleared_index(
        &mut self,
        cleared_index: Option<usize>,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let candidate =
            cleared_index.and_then(|index| self.find_focus_candidate(index, &*host.tree));

        let Some((focus_target, child)) = candidate else {
            self.last_focused = None;
            return Ok(());
        };

        let prior = self
            .last_focused
            .as_ref()
            .map(|e| host.tree.focus_state(e))
            .unwrap_or(FocusState::Programmatic);
        let state = if prior == FocusState::Unfocused {
            FocusState::Programmatic
        } else {
            prior
        };

        host.tree.focus_without_activation(&focus_target, state);
        rdebug!(?child, ?state, "focus moved off a cleared element");
        self.last_focused = Some(child.clone());
        self.update_pin(&child, true, host)
    }

    /// Nearest held element at or after `cleared_index` (after a removal the successor has the
    /// same index), else the nearest one before it. Returns `(focus_target, host_child)`.
    fn find_focus_candidate(
        &self,
        cleared_index: usize,
        tree: &dyn VisualTree<E>,
    ) -> Option<(E, E)> {
        let mut previous: Option<(usize, &E)> = None;
        let mut next: Option<(usize, &E)> = None;

        for child in &self.children {
            let Some(record) = self.records.get(child) else {
                continue;
            };
            if !record.is_held_by_layout() {
                continue;
            }
            let Some(index) = record.index() else {
                continue;
            };
            if index < cleared_index {
                if previous.is_none_or(|(p, _)| index > p) {
                    previous = Some((index, child));
                }
            } else if next.is_none_or(|(n, _)| index < n) {
                next = Some((index, child));
            }
        }

        if let Some((_, child)) = next {
            let target = if tree.is_focusable(child) {
                Some(child.clone())
            } else {
                tree.first_focusable_descendant(child)
            };
            if let Some(target) = target {
                return Some((target, child.clone()));
            }
        }

        if let Some((_, child)) = previous {
            let target = if tree.is_focusable(child) {
                Some(child.clone())
            } else {
                tree.last_focusable_descendant(child)
            };
            if let Some(target) = target {
                return Some((target, child.clone()));
            }
        }

        None
    }

    /// Pins or unpins the host child containing `element`, ignoring elements that are not
    /// realized (they may have left realization since focus landed on them).
    pub(crate) fn update_pin(
        &mut self,
        element: &E,
        add_pin: bool,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let Some(child) = self.immediate_child(element, &*host.tree) else {
            return Ok(());
        };
        let record = self.record_mut_or_err(&child)?;
        if !record.is_realized() {
            rwarn!(?child, add_pin, "pin update skipped for an unrealized element");
            return Ok(());
        }
        if add_pin {
            record.add_pin()?;
        } else if record.is_pinned() && record.remove_pin()? == 0 {
            // Reclaimed by the next measure pass unless the layout asks for it again.
            host.invalidation.invalidate_measure();
        }
        Ok(())
    }

    pub(crate) fn pin_element(
        &mut self,
        element: &E,
        host: &mut HostServices<E, D>,
    ) -> Result<u32, RepeaterError> {
        let child = self
            .immediate_child(element, &*host.tree)
            .ok_or(RepeaterError::UnknownElement)?;
        self.record_mut_or_err(&child)?.add_pin()
    }

    pub(crate) fn unpin_element(
        &mut self,
        element: &E,
        host: &mut HostServices<E, D>,
    ) -> Result<u32, RepeaterError> {
        let child = self
            .immediate_child(element, &*host.tree)
            .ok_or(RepeaterError::UnknownElement)?;
        let remaining = self.record_mut_or_err(&child)?.remove_pin()?;
        if remaining == 0 {
            host.invalidation.invalidate_measure();
        }
        Ok(remaining)
    }

    pub(crate) fn update_focused_element(
        &mut self,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let focused = host
            .tree
            .focused_element()
            .and_then(|f| self.immediate_child(&f, &*host.tree))
            .filter(|child| self.records.get(child).is_some_and(|r| r.is_realized()));

        if self.last_focused == focused {
            return Ok(());
        }
        if let Some(previous) = self.last_focused.clone() {
            self.update_pin(&previous, false, host)?;
        }
        if let Some(current) = &focused {
            self.update_pin(current, true, host)?;
        }
        self.last_focused = focused;
        Ok(())
    }

    /// Releases pinned-pool elements that lost their last pin.
    pub(crate) fn prune_pinned_elements(
        &mut self,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let records = &self.records;
        let unpinned = self
            .pinned_pool
            .extract(|e| records.get(e).is_none_or(|r| !r.is_pinned()));
        for element in unpinned {
            rtrace!(?element, "pruned from pinned pool");
            self.clear_element_to_factory(&element, host)?;
        }
        Ok(())
    }

    fn update_element_index(&mut self, element: &E, index: usize, host: &HostServices<E, D>) {
        let Some(record) = self.records.get_mut(element) else {
            return;
        };
        let old = record.index();
        if old != Some(index) {
            record.update_index(index);
            if let Some(old) = old {
                host.options.notify_index_changed(element, old, index);
            }
        }
    }

    fn ensure_realized_bounds(&mut self) {
        if self.realized_bounds.is_none() {
            self.element_if_held_by_layout(0);
        }
    }

    fn realized_index(&self, element: &E) -> Option<usize> {
        self.records
            .get(element)
            .filter(|r| r.is_realized())
            .and_then(|r| r.index())
    }

    /// Applies an already validated change to every record index and pool.
    pub(crate) fn on_items_changed(
        &mut self,
        change: &CollectionChange,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        match change.kind {
            CollectionChangeKind::Add => {
                let at = change.new_index.ok_or(RepeaterError::InvalidCollectionChange(
                    "add requires a starting index",
                ))?;
                let count = change.new_count;
                self.ensure_realized_bounds();
                match self.realized_bounds {
                    Some(bounds) if at <= bounds.last => {
                        self.realized_bounds = Some(IndexBounds {
                            first: bounds.first,
                            last: bounds.last + count,
                        });
                        for child in self.children.clone() {
                            if let Some(index) = self.realized_index(&child) {
                                if index >= at {
                                    self.update_element_index(&child, index + count, host);
                                }
                            }
                        }
                    }
                    _ => {
                        // Nothing held by the layout moves; pinned elements still might.
                        let pinned: Vec<E> = self.pinned_pool.iter().cloned().collect();
                        for element in pinned {
                            if let Some(index) = self.realized_index(&element) {
                                if index >= at {
                                    self.update_element_index(&element, index + count, host);
                                }
                            }
                        }
                    }
                }
            }

            CollectionChangeKind::Replace => {
                let at = change.old_index.ok_or(RepeaterError::InvalidCollectionChange(
                    "replace requires a starting index",
                ))?;
                let old_end = change.old_end()?;
                // Replaced items take their elements with them, as a removal would.
                for child in self.children.clone() {
                    let replaced = self.records.get(&child).is_some_and(|r| {
                        r.is_realized()
                            && r.auto_recycle_candidate()
                            && r.index().is_some_and(|i| at <= i && i < old_end)
                    });
                    if replaced {
                        self.clear_from_host(&child, host)?;
                    }
                }

                let count_change = change.new_count as isize - change.old_count as isize;
                if count_change != 0 {
                    self.ensure_realized_bounds();
                    for child in self.children.clone() {
                        if let Some(index) = self.realized_index(&child) {
                            if index >= old_end {
                                let shifted = index.saturating_add_signed(count_change);
                                self.update_element_index(&child, shifted, host);
                            }
                        }
                    }
                    let shift = |i: usize| {
                        if i >= old_end {
                            i.saturating_add_signed(count_change)
                        } else {
                            i
                        }
                    };
                    self.realized_bounds = self.realized_bounds.and_then(|b| {
                        let (first, last) = (shift(b.first), shift(b.last));
                        (first <= last).then_some(IndexBounds { first, last })
                    });
                }
            }

            CollectionChangeKind::Remove => {
                let at = change.old_index.ok_or(RepeaterError::InvalidCollectionChange(
                    "remove requires a starting index",
                ))?;
                let count = change.old_count;
                let old_end = change.old_end()?;
                for child in self.children.clone() {
                    let Some(record) = self.records.get(&child) else {
                        continue;
                    };
                    if !record.is_realized() {
                        continue;
                    }
                    let Some(index) = record.index() else {
                        continue;
                    };
                    if record.auto_recycle_candidate() && at <= index && index < old_end {
                        self.clear_from_host(&child, host)?;
                    } else if index >= old_end {
                        self.update_element_index(&child, index - count, host);
                    }
                }
                self.realized_bounds = None;
            }

            CollectionChangeKind::Reset => {
                // Back-to-back resets before the next layout pass have nothing more to clear.
                if !self.stable_reset_pending {
                    debug_assert!(self.reset_pool.is_empty());
                    if host.source.as_ref().is_some_and(|s| s.has_stable_keys()) {
                        self.stable_reset_pending = true;
                    }
                    for child in self.children.clone() {
                        let clear = self
                            .records
                            .get(&child)
                            .is_some_and(|r| r.is_realized() && r.auto_recycle_candidate());
                        if clear {
                            self.clear_from_host(&child, host)?;
                        }
                    }
                }
                self.realized_bounds = None;
            }
        }

        rdebug!(kind = ?change.kind, bounds = ?self.realized_bounds, "collection change applied");
        Ok(())
    }

    /// A layout swap lets elements cleared by the old layout be reclaimed by key.
    pub(crate) fn on_layout_changing(&mut self, host: &HostServices<E, D>) {
        if host.source.as_ref().is_some_and(|s| s.has_stable_keys()) {
            self.stable_reset_pending = true;
        }
    }

    /// Hands back everything an outgoing layout held. With a keyed source the elements wait in
    /// the reset pool for the next layout to claim them by key.
    pub(crate) fn release_layout_elements(
        &mut self,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        for child in self.children.clone() {
            if self.is_held_by_layout(&child) {
                self.clear_from_host(&child, host)?;
            }
        }
        self.realized_bounds = None;
        rdebug!(pooled = self.reset_pool.len(), "released outgoing layout elements");
        Ok(())
    }

    /// Clears every element the layout held but did not ask for during this measure.
    pub(crate) fn recycle_unkept(
        &mut self,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        for child in self.children.clone() {
            let stale = self.records.get(&child).is_some_and(|r| {
                r.is_held_by_layout() && r.auto_recycle_candidate() && !r.keep_alive()
            });
            if stale {
                self.clear_from_host(&child, host)?;
            }
        }
        Ok(())
    }

    /// Releases reset-pool survivors no key matched during the pass.
    pub(crate) fn on_owner_arranged(
        &mut self,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        if !self.stable_reset_pending {
            return Ok(());
        }
        self.stable_reset_pending = false;

        for element in self.reset_pool.drain() {
            self.clear_element(&element, true, host)?;
            host.viewport.on_element_cleared(&element);
        }
        self.realized_bounds = None;
        Ok(())
    }

    /// Resets keep-alive marks and parks released elements off screen.
    pub(crate) fn finish_arrange(&mut self, host: &mut HostServices<E, D>) {
        let parked = host.options.cleared_elements_arrange_position;
        for child in &self.children {
            let Some(record) = self.records.get_mut(child) else {
                continue;
            };
            record.keep_alive = false;
            if matches!(
                record.owner(),
                ElementOwner::Unrealized | ElementOwner::StableKeyPending
            ) {
                host.tree
                    .arrange(child, Rect::new(parked.x, parked.y, 0.0, 0.0));
            }
        }
    }

    pub(crate) fn measure_element(
        &mut self,
        element: &E,
        available: Size,
        host: &mut HostServices<E, D>,
    ) -> Result<Size, RepeaterError> {
        self.record_mut_or_err(element)?.measure_size = available;
        Ok(host.tree.measure(element, available))
    }

    pub(crate) fn arrange_element(
        &mut self,
        element: &E,
        bounds: Rect,
        host: &mut HostServices<E, D>,
    ) -> Result<(), RepeaterError> {
        let record = self.record_mut_or_err(element)?;
        let previous = record.arrange_bounds;
        record.arrange_bounds = bounds;
        host.tree.arrange(element, bounds);
        if previous != Rect::INVALID && previous != bounds {
            host.transitions
                .on_element_bounds_changed(element, previous, bounds)?;
        }
        Ok(())
    }

    pub(crate) fn do_phased_work(
        &mut self,
        host: &mut HostServices<E, D>,
        budget: &mut dyn FrameBudget,
    ) -> Result<PhaseOutcome, RepeaterError> {
        let visible_window = host.viewport.layout_visible_window();
        self.phaser.do_phased_work(
            &mut self.records,
            host.source.as_ref(),
            &*host.factory,
            &mut *host.tree,
            visible_window,
            budget,
        )
    }
}
