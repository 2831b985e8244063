use alloc::string::String;
use alloc::vec::Vec;

use crate::key::KeyMap;
use crate::{ElementKey, RepeaterError};

/// Elements parked across a reset of a keyed data source, waiting to be matched by key.
#[derive(Clone, Debug)]
pub struct StableKeyResetPool<E: ElementKey> {
    elements: KeyMap<String, E>,
}

impl<E: ElementKey> Default for StableKeyResetPool<E> {
    fn default() -> Self {
        Self {
            elements: KeyMap::new(),
        }
    }
}

impl<E: ElementKey> StableKeyResetPool<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.elements.contains_key(key)
    }

    pub(crate) fn add(&mut self, key: String, element: E) -> Result<(), RepeaterError> {
        if self.elements.contains_key(key.as_str()) {
            return Err(RepeaterError::DuplicateStableKey { key });
        }
        self.elements.insert(key, element);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<E> {
        self.elements.remove(key)
    }

    /// Empties the pool, handing back whatever was never matched.
    pub(crate) fn drain(&mut self) -> Vec<E> {
        let leftovers = self.elements.values().cloned().collect();
        self.elements.clear();
        leftovers
    }
}
