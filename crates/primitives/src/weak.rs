//! Weakly-held collections.
//!
//! # Role
//!
//! These containers let an owner track consumer-held objects without keeping
//! them alive. Dead references are dropped opportunistically: on insertion, or
//! when the owner calls `prune`. Nothing here runs in the background.
//!
//! - [`WeakSequence`]: ordered `Weak<T>` list.
//! - [`WeakValues`]: map whose values are held weakly.
//! - [`LinkedSequence`]: strongly held items that live only as long as a
//!   weakly held owner.

use std::any::Any;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;

/// Ordered sequence of weak references.
pub struct WeakSequence<T: ?Sized> {
	refs: Vec<Weak<T>>,
}

impl<T: ?Sized> Default for WeakSequence<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: ?Sized> Clone for WeakSequence<T> {
	fn clone(&self) -> Self {
		Self {
			refs: self.refs.clone(),
		}
	}
}

impl<T: ?Sized> WeakSequence<T> {
	pub const fn new() -> Self {
		Self { refs: Vec::new() }
	}

	/// Appends a weak reference to `item`, dropping dead references first.
	pub fn push(&mut self, item: &Arc<T>) {
		self.prune();
		self.refs.push(Arc::downgrade(item));
	}

	/// Removes the reference to the same allocation as `item`.
	pub fn remove(&mut self, item: &Arc<T>) -> bool {
		let target = Arc::downgrade(item);
		let before = self.refs.len();
		self.refs.retain(|weak| !Weak::ptr_eq(weak, &target));
		self.refs.len() != before
	}

	/// Drops dead references, returning how many were removed.
	pub fn prune(&mut self) -> usize {
		let before = self.refs.len();
		self.refs.retain(|weak| weak.strong_count() > 0);
		before - self.refs.len()
	}

	/// Upgrades every live reference, in insertion order.
	pub fn live(&self) -> Vec<Arc<T>> {
		self.refs.iter().filter_map(Weak::upgrade).collect()
	}

	/// Number of tracked references, dead or alive.
	pub fn len(&self) -> usize {
		self.refs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.refs.is_empty()
	}

	pub fn clear(&mut self) {
		self.refs.clear();
	}
}

/// Map whose values are held weakly.
pub struct WeakValues<K, V: ?Sized> {
	map: FxHashMap<K, Weak<V>>,
}

impl<K, V: ?Sized> Default for WeakValues<K, V> {
	fn default() -> Self {
		Self {
			map: FxHashMap::default(),
		}
	}
}

impl<K: Clone, V: ?Sized> Clone for WeakValues<K, V> {
	fn clone(&self) -> Self {
		Self {
			map: self.map.clone(),
		}
	}
}

impl<K: Eq + Hash, V: ?Sized> WeakValues<K, V> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the value for `key` if it is still alive.
	pub fn get(&self, key: &K) -> Option<Arc<V>> {
		self.map.get(key).and_then(Weak::upgrade)
	}

	/// Maps `key` to a weak reference of `value`, dropping dead slots first.
	pub fn insert(&mut self, key: K, value: &Arc<V>) {
		self.prune();
		self.map.insert(key, Arc::downgrade(value));
	}

	pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
		self.map.remove(key).and_then(|weak| weak.upgrade())
	}

	/// Drops slots whose values are gone, returning how many were removed.
	pub fn prune(&mut self) -> usize {
		let before = self.map.len();
		self.map.retain(|_, weak| weak.strong_count() > 0);
		before - self.map.len()
	}

	/// Returns true if any slot refers to a dropped value.
	pub fn has_dead(&self) -> bool {
		self.map.values().any(|weak| weak.strong_count() == 0)
	}

	/// Upgrades every live value.
	pub fn values(&self) -> Vec<Arc<V>> {
		self.map.values().filter_map(Weak::upgrade).collect()
	}

	/// Number of slots, dead or alive.
	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}
}

struct Link<T> {
	owner: Weak<dyn Any + Send + Sync>,
	item: T,
}

/// Items kept alive only while their linked owner is alive.
///
/// The sequence holds each item strongly and its owner weakly. Once an owner
/// is dropped the item is returned from the next [`LinkedSequence::prune`], so
/// the caller can tear it down.
pub struct LinkedSequence<T> {
	links: Vec<Link<T>>,
}

impl<T> Default for LinkedSequence<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> LinkedSequence<T> {
	pub const fn new() -> Self {
		Self { links: Vec::new() }
	}

	/// Links `item` to the lifetime of `owner`.
	pub fn link<O>(&mut self, item: T, owner: &Arc<O>)
	where
		O: Any + Send + Sync,
	{
		let owner = Arc::downgrade(owner);
		let owner: Weak<dyn Any + Send + Sync> = owner;
		self.links.push(Link { owner, item });
	}

	/// Removes the first item matching `pred`, regardless of owner liveness.
	pub fn unlink_by(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
		let index = self.links.iter().position(|link| pred(&link.item))?;
		Some(self.links.remove(index).item)
	}

	/// Removes and returns every item whose owner has been dropped.
	pub fn prune(&mut self) -> Vec<T> {
		let mut dead = Vec::new();
		let mut index = 0;
		while index < self.links.len() {
			if self.links[index].owner.strong_count() == 0 {
				dead.push(self.links.remove(index).item);
			} else {
				index += 1;
			}
		}
		dead
	}

	/// Iterates items whose owners are still alive.
	pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
		self.links
			.iter()
			.filter(|link| link.owner.strong_count() > 0)
			.map(|link| &link.item)
	}

	/// Number of links, dead or alive.
	pub fn len(&self) -> usize {
		self.links.len()
	}

	pub fn is_empty(&self) -> bool {
		self.links.is_empty()
	}
}
