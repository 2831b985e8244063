//! A headless element-lifecycle and virtualization core for items-repeater style hosts.
//!
//! The repeater sits between a data source, an element factory, and a pluggable layout. The
//! layout decides which indices to realize; the repeater decides where each element comes from
//! and where it goes when the layout lets go of it:
//! - a stable-key reset pool, so a collection reset with keyed data reuses elements by key
//! - a pinned pool, so focused (or explicitly pinned) elements survive scrolling away
//! - an exit animator, which may hold an element until its hide transition finishes
//! - the factory, for everything else
//!
//! Around that core it tracks the realization window (visible viewport plus a cache buffer that
//! grows a little every frame) and schedules incremental, phased data binding under a per-frame
//! budget.
//!
//! It is UI-agnostic. The embedding framework provides:
//! - element handles (`E`) and the visual tree they live in ([`VisualTree`])
//! - an [`ElementFactory`] and an [`ItemsSource`]
//! - a [`Layout`]
//! - layout passes, collection-change notifications, viewport signals, and frame ticks
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod error;
mod factory;
mod host;
mod key;
mod layout;
mod options;
mod phaser;
mod pinned_pool;
mod record;
mod reset_pool;
mod source;
mod transition;
mod tree;
mod types;
mod view_manager;
mod viewport;


pub use error::RepeaterError;
pub use factory::{BindingComponent, ElementFactory};
pub use host::Repeater;
pub use key::ElementKey;
pub use layout::{ElementRealizationOptions, Layout, LayoutContext};
pub use options::{
    CLEARED_ELEMENTS_ARRANGE_POSITION, DEFAULT_CACHE_BUFFER_INFLATION, ElementClearingCallback,
    ElementIndexChangedCallback, ElementPreparedCallback, RepeaterOptions,
};
pub use phaser::{FrameBudget, PhaseOutcome};
pub use pinned_pool::PinnedPool;
pub use record::VirtualizationRecord;
pub use reset_pool::StableKeyResetPool;
pub use source::{CollectionChange, CollectionChangeKind, ItemsSource};
pub use transition::{ElementAnimator, ItemTransition, TransitionOperation, TransitionTriggers};
pub use tree::VisualTree;
pub use types::{
    ElementOwner, FocusState, IndexBounds, PHASE_NOT_SPECIFIED, PHASE_REACHED_END, Point, Rect,
    Size,
};
pub use viewport::{ViewportTracker, WindowState};
