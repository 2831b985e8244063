#[cfg(not(feature = "std"))]
use alloc::collections::BTreeMap;
#[cfg(feature = "std")]
use std::collections::HashMap;

/// Side table keyed by element identity (or by stable item key).
#[cfg(feature = "std")]
pub(crate) type KeyMap<K, V> = HashMap<K, V>;
#[cfg(not(feature = "std"))]
pub(crate) type KeyMap<K, V> = BTreeMap<K, V>;

/// Identity of a visual element as seen by the repeater.
///
/// Elements are opaque handles: the repeater only compares, clones, and uses them as map keys.
/// With `std` the handle must be hashable; without it, ordered.
#[cfg(feature = "std")]
pub trait ElementKey: Clone + core::fmt::Debug + core::hash::Hash + Eq {}
#[cfg(feature = "std")]
impl<T: Clone + core::fmt::Debug + core::hash::Hash + Eq> ElementKey for T {}

#[cfg(not(feature = "std"))]
pub trait ElementKey: Clone + core::fmt::Debug + Ord {}
#[cfg(not(feature = "std"))]
impl<T: Clone + core::fmt::Debug + Ord> ElementKey for T {}
