use alloc::vec::Vec;

use crate::ElementKey;

/// Elements the layout let go of while something (usually focus) still pinned them.
///
/// Kept in the order elements were parked.
#[derive(Clone, Debug)]
pub struct PinnedPool<E> {
    elements: Vec<E>,
}

impl<E> Default for PinnedPool<E> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
        }
    }
}

impl<E: ElementKey> PinnedPool<E> {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, element: &E) -> bool {
        self.elements.contains(element)
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.elements.iter()
    }

    pub(crate) fn push(&mut self, element: E) {
        debug_assert!(!self.elements.contains(&element), "element pinned twice");
        self.elements.push(element);
    }

    /// Removes and returns the first element matching `pred`.
    pub(crate) fn take_first(&mut self, mut pred: impl FnMut(&E) -> bool) -> Option<E> {
        let pos = self.elements.iter().position(|e| pred(e))?;
        Some(self.elements.remove(pos))
    }

    pub(crate) fn remove(&mut self, element: &E) -> bool {
        self.take_first(|e| e == element).is_some()
    }

    /// Removes and returns every element matching `pred`, preserving order.
    pub(crate) fn extract(&mut self, mut pred: impl FnMut(&E) -> bool) -> Vec<E> {
        let mut taken = Vec::new();
        self.elements.retain(|e| {
            if pred(e) {
                taken.push(e.clone());
                false
            } else {
                true
            }
        });
        taken
    }
}
