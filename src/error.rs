use alloc::string::String;

use crate::ElementOwner;

/// Contract violations reported by the repeater core.
///
/// None of these are retried or masked internally: each one means a caller or a collaborating
/// strategy (layout, animator, factory, binding component) broke the protocol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepeaterError {
    #[error("reentrancy detected during layout")]
    LayoutReentrancy,

    #[error("{operation} is not allowed during layout")]
    MutationDuringLayout { operation: &'static str },

    #[error("{operation} is not allowed while a collection change is being processed")]
    MutationDuringCollectionChange { operation: &'static str },

    #[error("index {index} is out of range for {count} items")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("cannot pin an element that is not realized")]
    PinUnrealized,

    #[error("cannot unpin an element that is not realized")]
    UnpinUnrealized,

    #[error("unpin called more times than pin")]
    PinImbalance,

    #[error("illegal ownership transition from {from:?} to {to:?}")]
    InvalidTransition { from: ElementOwner, to: ElementOwner },

    #[error("phases must increase monotonically (current {current}, next {next})")]
    NonMonotonicPhase { current: i32, next: i32 },

    #[error("duplicate stable key {key:?} in the reset pool")]
    DuplicateStableKey { key: String },

    #[error("a cleared element is still queued for phasing")]
    ClearedElementQueued,

    #[error("element is not a descendant of this repeater")]
    UnknownElement,

    #[error("cache length must be finite and non-negative, got {0}")]
    InvalidCacheLength(f64),

    #[error("no layout is attached")]
    NoLayout,

    #[error("no items source is attached")]
    NoItemsSource,

    #[error("invalid collection change: {0}")]
    InvalidCollectionChange(&'static str),

    #[error("{0}")]
    Collaborator(String),
}
