//! Push notifications for watchers of a query.
//!
//! A watch subscribes to every source the registry holds, now and later.
//! Matching registrations are wrapped once through the watch's own
//! [`EntryCache`] and handed to a [`Mediator`] together with the watcher.
//! The watcher is held weakly: once the embedding code drops it,
//! notifications stop and the registry prunes the subscription on its next
//! mutation.

use std::fmt;
use std::sync::{Arc, Weak};

use beacon_primitives::Rank;

pub use crate::error::MediatorError;
use crate::binding::BindingRef;
use crate::cache::EntryCache;
use crate::entry::Entry;
use crate::error::RegistryError;
use crate::key::{Qualifier, Query};
use crate::source::Subscriber;

/// Delivers registration changes to a watcher of type `W`.
///
/// Callbacks run while the registry's lock is held and must not call back
/// into the registry.
pub trait Mediator<W>: Send + Sync {
	/// A matching registration appeared.
	fn on_add(
		&self,
		qualifier: Option<&Qualifier>,
		entry: &Arc<Entry>,
		watcher: &W,
	) -> Result<(), MediatorError>;

	/// A previously announced registration went away.
	fn on_remove(
		&self,
		qualifier: Option<&Qualifier>,
		entry: &Arc<Entry>,
		watcher: &W,
	) -> Result<(), MediatorError>;
}

/// Identity of one `watch` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub(crate) u64);

impl WatchId {
	pub fn get(self) -> u64 {
		self.0
	}
}

/// Returned by [`crate::Registry::watch`]; pass it to
/// [`crate::Registry::unwatch`] to end the subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchHandle {
	pub(crate) id: WatchId,
	pub(crate) query: Query,
}

impl WatchHandle {
	pub fn id(&self) -> WatchId {
		self.id
	}

	pub fn query(&self) -> &Query {
		&self.query
	}
}

/// Subscriber side of a watch.
pub(crate) struct WatchedBindings<W> {
	query: Query,
	mediator: Arc<dyn Mediator<W>>,
	watcher: Weak<W>,
	cache: EntryCache,
}

impl<W> WatchedBindings<W> {
	pub(crate) fn new(query: Query, mediator: Arc<dyn Mediator<W>>, watcher: &Arc<W>) -> Self {
		Self {
			query,
			mediator,
			watcher: Arc::downgrade(watcher),
			cache: EntryCache::new(),
		}
	}
}

impl<W: Send + Sync> Subscriber for WatchedBindings<W> {
	fn add(&self, binding: BindingRef, rank: Rank) -> Result<(), RegistryError> {
		let filter = self.query.filter();
		if !filter.matches(&binding) {
			return Ok(());
		}
		let (entry, created) = self.cache.insert(filter.report(&binding), &binding, rank);
		if !created {
			return Ok(());
		}
		let Some(watcher) = self.watcher.upgrade() else {
			return Ok(());
		};
		if let Err(err) = self.mediator.on_add(entry.qualifier(), &entry, &watcher) {
			// Unannounced entries must not produce a removal.
			self.cache.remove(&binding);
			return Err(RegistryError::Mediator(err));
		}
		Ok(())
	}

	fn remove(&self, binding: &BindingRef) -> Result<(), RegistryError> {
		let Some(entry) = self.cache.remove(binding) else {
			return Ok(());
		};
		let Some(watcher) = self.watcher.upgrade() else {
			return Ok(());
		};
		self.mediator
			.on_remove(entry.qualifier(), &entry, &watcher)
			.map_err(RegistryError::Mediator)
	}

	fn bindings(&self) -> Vec<BindingRef> {
		self.cache.bindings()
	}
}

impl<W> fmt::Debug for WatchedBindings<W> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WatchedBindings")
			.field("query", &self.query)
			.field("live", &(self.watcher.strong_count() > 0))
			.field("entries", &self.cache.len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
