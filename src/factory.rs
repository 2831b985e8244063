use alloc::rc::Rc;

use crate::RepeaterError;

/// Creates elements for data items and takes them back when they leave realization.
pub trait ElementFactory<E, D> {
    /// Returns an element for `data`, either fresh or reused from the factory's own cache.
    fn get_element(&mut self, data: &Rc<D>, index: usize) -> Result<E, RepeaterError>;

    fn recycle_element(&mut self, element: E);

    /// Compiled binding component at the element root, if the element binds incrementally.
    fn binding_component(&self, _element: &E) -> Option<Rc<dyn BindingComponent<D>>> {
        None
    }

    /// Assigns (or clears, with `None`) the element's data context.
    ///
    /// Only called for elements without a binding component.
    fn set_data_context(&mut self, _element: &E, _data: Option<Rc<D>>) {}
}

/// Incremental, phase-by-phase data binding for one element.
pub trait BindingComponent<D> {
    /// Drops whatever the component bound last time.
    fn recycle(&self);

    /// Runs the bindings of `phase` and returns the next phase to run,
    /// or [`crate::PHASE_REACHED_END`] when done.
    fn process_bindings(
        &self,
        data: &D,
        index: Option<usize>,
        phase: i32,
    ) -> Result<i32, RepeaterError>;
}
