use alloc::rc::Rc;
use alloc::string::String;

use crate::RepeaterError;

/// Read-only view over the data the repeater presents.
///
/// Owners mutate their data themselves and then report the edit through
/// [`crate::Repeater::on_items_changed`].
pub trait ItemsSource<D> {
    fn count(&self) -> usize;

    fn get_at(&self, index: usize) -> Rc<D>;

    /// Whether every item carries a key that survives a reset.
    fn has_stable_keys(&self) -> bool {
        false
    }

    fn key_from_index(&self, _index: usize) -> Option<String> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CollectionChangeKind {
    Add,
    Remove,
    Replace,
    Reset,
}

/// A change notification from the data source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionChange {
    pub kind: CollectionChangeKind,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
    pub old_count: usize,
    pub new_count: usize,
}

impl CollectionChange {
    pub fn add(index: usize, count: usize) -> Self {
        Self {
            kind: CollectionChangeKind::Add,
            old_index: None,
            new_index: Some(index),
            old_count: 0,
            new_count: count,
        }
    }

    pub fn remove(index: usize, count: usize) -> Self {
        Self {
            kind: CollectionChangeKind::Remove,
            old_index: Some(index),
            new_index: None,
            old_count: count,
            new_count: 0,
        }
    }

    pub fn replace(index: usize, old_count: usize, new_count: usize) -> Self {
        Self {
            kind: CollectionChangeKind::Replace,
            old_index: Some(index),
            new_index: Some(index),
            old_count,
            new_count,
        }
    }

    pub fn reset() -> Self {
        Self {
            kind: CollectionChangeKind::Reset,
            old_index: None,
            new_index: None,
            old_count: 0,
            new_count: 0,
        }
    }

    /// Whether clearing elements during this change must bypass the pinned pool.
    pub(crate) fn is_structural(&self) -> bool {
        matches!(
            self.kind,
            CollectionChangeKind::Remove | CollectionChangeKind::Replace | CollectionChangeKind::Reset
        )
    }

    /// One past the last index the change took out of the source.
    pub(crate) fn old_end(&self) -> Result<usize, RepeaterError> {
        self.old_index
            .and_then(|at| at.checked_add(self.old_count))
            .ok_or(RepeaterError::InvalidCollectionChange(
                "old range overflows the index space",
            ))
    }

    /// Checks the change's shape, then its ranges against `item_count`, the source's count after
    /// the change was applied.
    pub(crate) fn validate(&self, item_count: usize) -> Result<(), RepeaterError> {
        self.validate_shape()?;
        self.validate_ranges(item_count)
    }

    fn validate_shape(&self) -> Result<(), RepeaterError> {
        match self.kind {
            CollectionChangeKind::Add => {
                if self.new_index.is_none() {
                    return Err(RepeaterError::InvalidCollectionChange(
                        "add requires a starting index",
                    ));
                }
            }
            CollectionChangeKind::Remove => {
                if self.old_index.is_none() {
                    return Err(RepeaterError::InvalidCollectionChange(
                        "remove requires a starting index",
                    ));
                }
            }
            CollectionChangeKind::Replace => {
                if self.old_index.is_none() || self.old_index != self.new_index {
                    return Err(RepeaterError::InvalidCollectionChange(
                        "replace requires equal old and new starting indices",
                    ));
                }
                if self.old_count == 0 {
                    return Err(RepeaterError::InvalidCollectionChange(
                        "replace with no old items, use add instead",
                    ));
                }
                if self.new_count == 0 {
                    return Err(RepeaterError::InvalidCollectionChange(
                        "replace with no new items, use remove instead",
                    ));
                }
            }
            CollectionChangeKind::Reset => {}
        }
        Ok(())
    }

    fn validate_ranges(&self, item_count: usize) -> Result<(), RepeaterError> {
        let out_of_range = RepeaterError::InvalidCollectionChange("range exceeds the item count");
        // Items present before the change: what is left now, less what arrived, plus what left.
        let count_before = item_count
            .checked_sub(self.new_count)
            .and_then(|c| c.checked_add(self.old_count))
            .ok_or(out_of_range.clone())?;

        if let Some(at) = self.new_index {
            let new_end = at
                .checked_add(self.new_count)
                .ok_or(RepeaterError::InvalidCollectionChange(
                    "new range overflows the index space",
                ))?;
            if new_end > item_count {
                return Err(out_of_range);
            }
        }
        if self.old_index.is_some() && self.old_end()? > count_before {
            return Err(out_of_range);
        }
        Ok(())
    }
}
