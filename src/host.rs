use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;

use crate::transition::TransitionCoordinator;
use crate::types::Invalidation;
use crate::view_manager::{HostServices, ViewManager};
use crate::{
    CollectionChange, ElementAnimator, ElementFactory, ElementKey, ElementRealizationOptions,
    FrameBudget, IndexBounds, ItemsSource, Layout, LayoutContext, PhaseOutcome, PinnedPool,
    Point, Rect, RepeaterError, RepeaterOptions, Size, StableKeyResetPool, TransitionOperation,
    TransitionTriggers, ViewportTracker, VirtualizationRecord, VisualTree,
};

/// Everything a layout may touch while the repeater drives it.
pub(crate) struct RepeaterCore<E: ElementKey, D> {
    pub(crate) view_manager: ViewManager<E, D>,
    pub(crate) services: HostServices<E, D>,
    pub(crate) layout_in_progress: bool,
    layout_origin: Point,
    layout_state: Option<Box<dyn Any>>,
    last_available_size: Size,
}

impl<E: ElementKey, D> RepeaterCore<E, D> {
    fn item_count(&self) -> usize {
        self.services.source.as_ref().map_or(0, |s| s.count())
    }

    fn suggested_anchor(&self) -> Option<E> {
        if let Some(anchor) = self.services.viewport.made_anchor() {
            return Some(anchor.clone());
        }
        let anchor = self.services.viewport.scroller_anchor()?;
        self.view_manager
            .immediate_child(anchor, &*self.services.tree)
    }

    fn recommended_anchor_index(&self) -> Option<usize> {
        let anchor = self.suggested_anchor()?;
        self.view_manager.element_index(&anchor)
    }
}

impl<E: ElementKey, D> LayoutContext<E> for RepeaterCore<E, D> {
    fn item_count(&self) -> usize {
        RepeaterCore::item_count(self)
    }

    fn get_or_create_element_at(
        &mut self,
        index: usize,
        options: ElementRealizationOptions,
    ) -> Result<E, RepeaterError> {
        let count = RepeaterCore::item_count(self);
        if index >= count {
            return Err(RepeaterError::IndexOutOfRange { index, count });
        }
        self.view_manager.get_element(
            index,
            options.contains(ElementRealizationOptions::FORCE_CREATE),
            options.contains(ElementRealizationOptions::SUPPRESS_AUTO_RECYCLE),
            &mut self.services,
        )
    }

    fn recycle_element(&mut self, element: &E) -> Result<(), RepeaterError> {
        self.view_manager
            .clear_from_host(element, &mut self.services)
    }

    fn realization_rect(&self) -> Rect {
        self.services.viewport.layout_realization_window()
    }

    fn visible_rect(&self) -> Rect {
        self.services.viewport.layout_visible_window()
    }

    fn recommended_anchor_index(&self) -> Option<usize> {
        RepeaterCore::recommended_anchor_index(self)
    }

    fn layout_origin(&self) -> Point {
        self.layout_origin
    }

    fn set_layout_origin(&mut self, origin: Point) {
        self.layout_origin = origin;
    }

    fn layout_state(&self) -> Option<&dyn Any> {
        self.layout_state.as_deref()
    }

    fn layout_state_mut(&mut self) -> Option<&mut dyn Any> {
        self.layout_state.as_deref_mut()
    }

    fn set_layout_state(&mut self, state: Option<Box<dyn Any>>) {
        self.layout_state = state;
    }

    fn measure_element(&mut self, element: &E, available: Size) -> Result<Size, RepeaterError> {
        self.view_manager
            .measure_element(element, available, &mut self.services)
    }

    fn arrange_element(&mut self, element: &E, bounds: Rect) -> Result<(), RepeaterError> {
        self.view_manager
            .arrange_element(element, bounds, &mut self.services)
    }
}

/// A headless items repeater.
///
/// The repeater owns no rendering. The embedding framework drives it with layout passes
/// ([`Repeater::measure`] / [`Repeater::arrange`]), collection changes, viewport signals, and
/// frame ticks; the attached [`Layout`] decides which indices to realize and the repeater moves
/// elements between the factory, the layout, and its recycling pools accordingly.
///
/// `E` is an element handle: cheap to clone, compared by identity.
pub struct Repeater<E: ElementKey, D> {
    layout: Option<Box<dyn Layout<E>>>,
    pub(crate) core: RepeaterCore<E, D>,
}

impl<E: ElementKey, D> Repeater<E, D> {
    pub fn new(
        factory: impl ElementFactory<E, D> + 'static,
        tree: impl VisualTree<E> + 'static,
    ) -> Self {
        let options = RepeaterOptions::default();
        Self {
            layout: None,
            core: RepeaterCore {
                view_manager: ViewManager::default(),
                services: HostServices {
                    source: None,
                    factory: Box::new(factory),
                    tree: Box::new(tree),
                    transitions: TransitionCoordinator::default(),
                    viewport: ViewportTracker::new(&options),
                    options,
                    invalidation: Invalidation::default(),
                    processing_change: None,
                },
                layout_in_progress: false,
                layout_origin: Point::ZERO,
                layout_state: None,
                last_available_size: Size::ZERO,
            },
        }
    }

    pub fn with_options(
        factory: impl ElementFactory<E, D> + 'static,
        tree: impl VisualTree<E> + 'static,
        options: RepeaterOptions<E>,
    ) -> Result<Self, RepeaterError> {
        let mut repeater = Self::new(factory, tree);
        repeater.set_options(options)?;
        Ok(repeater)
    }

    pub fn options(&self) -> &RepeaterOptions<E> {
        &self.core.services.options
    }

    pub fn set_options(&mut self, options: RepeaterOptions<E>) -> Result<(), RepeaterError> {
        options.validate()?;
        self.core.services.viewport.apply_options(&options)?;
        self.core.services.options = options;
        Ok(())
    }

    /// Changing either length restarts cache growth from zero.
    pub fn set_cache_lengths(&mut self, horizontal: f64, vertical: f64) -> Result<(), RepeaterError> {
        self.core
            .services
            .viewport
            .set_cache_lengths(horizontal, vertical)?;
        self.core.services.options.horizontal_cache_length = horizontal;
        self.core.services.options.vertical_cache_length = vertical;
        Ok(())
    }

    pub fn items_source(&self) -> Option<&Rc<dyn ItemsSource<D>>> {
        self.core.services.source.as_ref()
    }

    pub fn item_count(&self) -> usize {
        self.core.item_count()
    }

    pub fn layout(&self) -> Option<&dyn Layout<E>> {
        self.layout.as_deref()
    }

    pub fn set_animator(&mut self, animator: Option<Box<dyn ElementAnimator<E>>>) {
        self.core.services.transitions.set_animator(animator);
    }

    pub fn has_animator(&self) -> bool {
        self.core.services.transitions.has_animator()
    }

    fn check_layout_entry(&self) -> Result<(), RepeaterError> {
        if self.core.layout_in_progress {
            return Err(RepeaterError::LayoutReentrancy);
        }
        if self.core.services.processing_change.is_some() {
            return Err(RepeaterError::MutationDuringCollectionChange { operation: "layout" });
        }
        Ok(())
    }

    fn check_mutation(&self, operation: &'static str) -> Result<(), RepeaterError> {
        if self.core.layout_in_progress {
            return Err(RepeaterError::MutationDuringLayout { operation });
        }
        if self.core.services.processing_change.is_some() {
            return Err(RepeaterError::MutationDuringCollectionChange { operation });
        }
        Ok(())
    }

    pub fn measure(&mut self, available: Size) -> Result<Size, RepeaterError> {
        self.check_layout_entry()?;
        rdebug!(width = available.width, height = available.height, "measure");

        let core = &mut self.core;
        core.services.invalidation.measure = false;
        core.services.invalidation.arrange = true;
        let view_manager = &core.view_manager;
        core.services
            .viewport
            .on_owner_measuring(|e| view_manager.is_held_by_layout(e));

        core.layout_in_progress = true;
        let result = self.measure_pass(available);
        self.core.layout_in_progress = false;
        result
    }

    fn measure_pass(&mut self, available: Size) -> Result<Size, RepeaterError> {
        let core = &mut self.core;
        core.view_manager
            .prune_pinned_elements(&mut core.services)?;

        let desired = match self.layout.as_mut() {
            Some(layout) => layout.measure(&mut self.core, available)?,
            None => Size::ZERO,
        };

        let core = &mut self.core;
        let origin = core.layout_origin;
        core.services.viewport.set_layout_extent(Rect::new(
            origin.x,
            origin.y,
            desired.width,
            desired.height,
        ));

        // Anything the layout held last pass but did not ask for this pass goes back.
        core.view_manager.recycle_unkept(&mut core.services)?;
        core.last_available_size = available;
        Ok(desired)
    }

    pub fn arrange(&mut self, final_size: Size) -> Result<Size, RepeaterError> {
        self.check_layout_entry()?;
        rdebug!(width = final_size.width, height = final_size.height, "arrange");

        self.core.services.invalidation.arrange = false;
        self.core.layout_in_progress = true;
        let result = self.arrange_pass(final_size);
        self.core.layout_in_progress = false;
        result
    }

    fn arrange_pass(&mut self, final_size: Size) -> Result<Size, RepeaterError> {
        let arranged = match self.layout.as_mut() {
            Some(layout) => layout.arrange(&mut self.core, final_size)?,
            None => final_size,
        };

        let core = &mut self.core;
        core.view_manager.on_owner_arranged(&mut core.services)?;
        core.view_manager.finish_arrange(&mut core.services);

        let services = &mut core.services;
        services.viewport.on_owner_arranged(&mut services.invalidation);
        services.transitions.on_owner_arranged();
        Ok(arranged)
    }

    /// Whether the embedding framework owes this host a measure pass.
    pub fn needs_measure(&self) -> bool {
        self.core.services.invalidation.measure
    }

    pub fn needs_arrange(&self) -> bool {
        self.core.services.invalidation.arrange
    }

    pub fn is_layout_in_progress(&self) -> bool {
        self.core.layout_in_progress
    }

    pub fn last_available_size(&self) -> Size {
        self.core.last_available_size
    }

    pub fn on_items_changed(&mut self, change: CollectionChange) -> Result<(), RepeaterError> {
        change.validate(self.core.item_count())?;
        self.check_mutation("collection change")?;
        rdebug!(?change, "items changed");

        self.core.services.processing_change = Some(change);
        let result = self.process_items_changed(&change);
        self.core.services.processing_change = None;
        result
    }

    fn process_items_changed(&mut self, change: &CollectionChange) -> Result<(), RepeaterError> {
        let core = &mut self.core;
        core.services.transitions.on_items_changed(change.kind);
        core.view_manager
            .on_items_changed(change, &mut core.services)?;

        match self.layout.as_mut() {
            Some(layout) if layout.is_virtualizing() => {
                layout.on_items_changed(&mut self.core, change)?;
            }
            _ => self.core.services.invalidation.invalidate_measure(),
        }
        Ok(())
    }

    /// Replaces the data source, releasing every realized element.
    pub fn set_items_source(
        &mut self,
        source: Option<Rc<dyn ItemsSource<D>>>,
    ) -> Result<(), RepeaterError> {
        self.check_mutation("items source change")?;

        let reset = CollectionChange::reset();
        self.core.services.processing_change = Some(reset);
        let result = self.swap_items_source(source, &reset);
        self.core.services.processing_change = None;
        self.core.services.invalidation.invalidate_measure();
        result
    }

    fn swap_items_source(
        &mut self,
        source: Option<Rc<dyn ItemsSource<D>>>,
        reset: &CollectionChange,
    ) -> Result<(), RepeaterError> {
        let core = &mut self.core;
        core.view_manager
            .release_all_realized(&mut core.services)?;
        core.services.source = source;

        if let Some(layout) = self.layout.as_mut() {
            if layout.is_virtualizing() {
                layout.on_items_changed(&mut self.core, reset)?;
            }
        }
        Ok(())
    }

    pub fn set_layout(&mut self, layout: Option<Box<dyn Layout<E>>>) -> Result<(), RepeaterError> {
        self.check_mutation("layout change")?;

        let core = &mut self.core;
        core.view_manager.on_layout_changing(&core.services);
        core.services.transitions.on_layout_changing();

        if let Some(mut old) = self.layout.take() {
            old.uninitialize(&mut self.core)?;
            let core = &mut self.core;
            core.view_manager
                .release_layout_elements(&mut core.services)?;
        }
        self.core.layout_state = None;

        let is_virtualizing = layout.as_ref().is_none_or(|l| l.is_virtualizing());
        self.layout = layout;
        if let Some(layout) = self.layout.as_mut() {
            layout.initialize(&mut self.core)?;
        }

        self.core.services.viewport.on_layout_changed(is_virtualizing);
        self.core.services.invalidation.invalidate_measure();
        Ok(())
    }

    /// Realizes the element for `index` now, even outside the current window, and makes it the
    /// anchor the next layout pass positions around.
    pub fn get_or_create_element(&mut self, index: usize) -> Result<E, RepeaterError> {
        let count = self.core.item_count();
        if index >= count {
            return Err(RepeaterError::IndexOutOfRange { index, count });
        }
        if self.core.layout_in_progress {
            return Err(RepeaterError::LayoutReentrancy);
        }

        let core = &mut self.core;
        let (element, outside_realized_range) = match core.view_manager.try_get_element(index) {
            Some(element) => (element, false),
            None => {
                if self.layout.is_none() {
                    return Err(RepeaterError::NoLayout);
                }
                let element =
                    core.view_manager
                        .get_element(index, false, false, &mut core.services)?;
                core.view_manager.measure_element(
                    &element,
                    Size::new(f32::INFINITY, f32::INFINITY),
                    &mut core.services,
                )?;
                (element, true)
            }
        };

        rdebug!(?element, index, outside_realized_range, "anchor made");
        core.services
            .viewport
            .on_make_anchor(Some(element.clone()), outside_realized_range);
        core.services.invalidation.invalidate_measure();
        Ok(element)
    }

    /// The realized element at `index`, without realizing anything.
    pub fn try_get_element(&self, index: usize) -> Option<E> {
        self.core.view_manager.try_get_element(index)
    }

    /// Index of a realized element, or of one parked awaiting a stable-key match.
    pub fn element_index(&self, element: &E) -> Option<usize> {
        self.core.view_manager.element_index(element)
    }

    pub fn record(&self, element: &E) -> Option<&VirtualizationRecord<D>> {
        self.core.view_manager.record(element)
    }

    /// Every element this host has realized at least once and not forgotten.
    pub fn children(&self) -> &[E] {
        self.core.view_manager.children()
    }

    pub fn realized_bounds(&self) -> Option<IndexBounds> {
        self.core.view_manager.realized_bounds()
    }

    pub fn reset_pool(&self) -> &StableKeyResetPool<E> {
        self.core.view_manager.reset_pool()
    }

    pub fn pinned_pool(&self) -> &PinnedPool<E> {
        self.core.view_manager.pinned_pool()
    }

    pub fn is_stable_reset_pending(&self) -> bool {
        self.core.view_manager.is_stable_reset_pending()
    }

    /// Drops the record of an element the factory has discarded for good.
    pub fn forget_element(&mut self, element: &E) -> Result<(), RepeaterError> {
        self.core.view_manager.forget_element(element)
    }

    /// Keeps the host child containing `element` realized until a matching unpin.
    pub fn pin_element(&mut self, element: &E) -> Result<u32, RepeaterError> {
        let core = &mut self.core;
        core.view_manager.pin_element(element, &mut core.services)
    }

    pub fn unpin_element(&mut self, element: &E) -> Result<u32, RepeaterError> {
        let core = &mut self.core;
        core.view_manager
            .unpin_element(element, &mut core.services)
    }

    /// Re-reads the focused element from the visual tree and moves the focus pin accordingly.
    pub fn on_focus_changed(&mut self) -> Result<(), RepeaterError> {
        let core = &mut self.core;
        core.view_manager
            .update_focused_element(&mut core.services)
    }

    pub fn last_focused(&self) -> Option<&E> {
        self.core.view_manager.last_focused()
    }

    /// The animator finished `operation` on `element`.
    pub fn on_transition_completed(
        &mut self,
        element: &E,
        operation: TransitionOperation,
    ) -> Result<(), RepeaterError> {
        if operation != TransitionOperation::Hide {
            return Ok(());
        }
        let core = &mut self.core;
        core.view_manager
            .finish_exit_animation(element, &mut core.services)
    }

    /// Triggers recorded since the last arrange.
    pub fn transition_triggers(&self) -> TransitionTriggers {
        self.core.services.transitions.recorded()
    }

    /// Whether [`Repeater::tick`] has work to do.
    pub fn needs_tick(&self) -> bool {
        self.core.view_manager.phaser().is_registered()
            || self.core.services.viewport.cache_build_outstanding()
    }

    pub fn phasing_queue_len(&self) -> usize {
        self.core.view_manager.phaser().len()
    }

    pub fn is_phasing(&self, element: &E) -> bool {
        self.core.view_manager.phaser().is_queued(element)
    }

    /// Runs per-frame work: completes an outstanding cache-buffer build and advances incremental
    /// data binding until `budget` asks to yield.
    pub fn tick(&mut self, mut budget: impl FrameBudget) -> Result<PhaseOutcome, RepeaterError> {
        if self.core.layout_in_progress {
            return Err(RepeaterError::LayoutReentrancy);
        }

        let core = &mut self.core;
        let services = &mut core.services;
        if services.viewport.cache_build_outstanding() {
            services
                .viewport
                .on_cache_build_completed(&mut services.invalidation);
        }

        if !core.view_manager.phaser().is_registered() {
            return Ok(PhaseOutcome::Idle);
        }
        core.view_manager
            .do_phased_work(&mut core.services, &mut budget)
    }

    pub fn viewport(&self) -> &ViewportTracker<E> {
        &self.core.services.viewport
    }

    /// The host's visible rectangle, in host coordinates, changed.
    pub fn on_effective_viewport_changed(&mut self, viewport: Rect) {
        let services = &mut self.core.services;
        services
            .viewport
            .on_effective_viewport_changed(viewport, &mut services.invalidation);
    }

    pub fn on_scroller_offset_changed(&mut self, offset: Point) {
        self.core.services.viewport.set_scroller_offset(offset);
    }

    /// The element the scrolling ancestor currently anchors on.
    pub fn set_scroll_anchor(&mut self, anchor: Option<E>) {
        self.core.services.viewport.set_scroller_anchor(anchor);
    }

    pub fn set_scroller_present(&mut self, present: bool) {
        self.core.services.viewport.on_scroller_changed(present);
    }

    /// The framework finished a full layout cycle.
    pub fn on_layout_updated(&mut self) {
        let services = &mut self.core.services;
        services
            .viewport
            .on_layout_updated(&mut services.invalidation);
    }

    pub fn on_frame_rendered(&mut self) {
        let held: Vec<E> = self.core.view_manager.held_by_layout();
        let services = &mut self.core.services;
        services
            .viewport
            .on_frame_rendered(held, &mut services.invalidation);
    }

    /// A descendant asked to be scrolled into view. Returns whether the scroll may animate.
    pub fn on_bring_into_view_requested(&mut self, target: &E) -> Result<bool, RepeaterError> {
        let child = self
            .core
            .view_manager
            .immediate_child(target, &*self.core.services.tree)
            .ok_or(RepeaterError::UnknownElement)?;
        Ok(self
            .core
            .services
            .viewport
            .on_bring_into_view_requested(&child))
    }

    pub fn suggested_anchor(&self) -> Option<E> {
        self.core.suggested_anchor()
    }

    pub fn recommended_anchor_index(&self) -> Option<usize> {
        self.core.recommended_anchor_index()
    }
}

impl<E: ElementKey, D> core::fmt::Debug for Repeater<E, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repeater")
            .field("children", &self.core.view_manager.children())
            .field("realized_bounds", &self.core.view_manager.realized_bounds())
            .field("layout_in_progress", &self.core.layout_in_progress)
            .field("options", &self.core.services.options)
            .finish_non_exhaustive()
    }
}
