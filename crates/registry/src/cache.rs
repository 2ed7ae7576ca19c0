//! Identity-keyed entry cache with a lock-free fast path.
//!
//! # Role
//!
//! Maps registrations (by [`BindingId`]) to their [`Entry`] so repeated
//! iteration hands out the same entry, and therefore the same memoized value.
//!
//! # Mental Model
//!
//! The whole cache is one atomic cell holding one of three states:
//!
//! | State | Meaning |
//! |-------|---------|
//! | `None` | nothing cached |
//! | `Single(entry)` | the common case of one registration per type |
//! | `Map(..)` | two or more registrations, identity map behind a narrow mutex |
//!
//! `None -> Single -> Map` and `Single -> None` are CAS transitions.
//! Once in `Map`, mutations take the map's mutex and first re-check that the
//! map is still the published state; `Map -> None` (collapse on empty) only
//! happens while holding that mutex.
//!
//! # Invariants
//!
//! - At most one entry per binding identity is ever handed out.
//!   - Enforced in: [`EntryCache::get_or_create`] (CAS loop, published-state re-check).
//!   - Tested by: `tests::test_concurrent_creation_yields_one_entry`.
//!   - Failure symptom: the provider runs more than once for one registration.
//! - An empty map is never left resident.
//!   - Enforced in: [`EntryCache::remove`].
//!   - Tested by: `tests::test_remove_collapses_map`.
//!   - Failure symptom: caches of dead aggregations keep allocations alive.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use beacon_primitives::Rank;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::binding::{BindingId, BindingRef};
use crate::entry::Entry;
use crate::key::Qualifier;

enum CacheState {
	Single(Arc<Entry>),
	Map(Mutex<FxHashMap<BindingId, Arc<Entry>>>),
}

/// Atomic cache mapping bindings to entries.
#[derive(Default)]
pub struct EntryCache {
	state: ArcSwapOption<CacheState>,
}

fn same_state(a: &Option<Arc<CacheState>>, b: &Option<Arc<CacheState>>) -> bool {
	match (a, b) {
		(Some(a), Some(b)) => Arc::ptr_eq(a, b),
		(None, None) => true,
		_ => false,
	}
}

impl EntryCache {
	pub fn new() -> Self {
		Self::default()
	}

	fn is_published(&self, state: &Option<Arc<CacheState>>) -> bool {
		same_state(&self.state.load(), state)
	}

	/// Returns the entry for `binding`, creating it if this is the first request.
	pub fn get_or_create(
		&self,
		qualifier: Option<Qualifier>,
		binding: &BindingRef,
		rank: Rank,
	) -> Arc<Entry> {
		self.insert(qualifier, binding, rank).0
	}

	/// Like [`EntryCache::get_or_create`], also reporting whether the entry is new.
	pub(crate) fn insert(
		&self,
		qualifier: Option<Qualifier>,
		binding: &BindingRef,
		rank: Rank,
	) -> (Arc<Entry>, bool) {
		let id = BindingId::of(binding);
		let mut fresh: Option<Arc<Entry>> = None;
		let make = |fresh: &mut Option<Arc<Entry>>| {
			fresh
				.get_or_insert_with(|| {
					Arc::new(Entry::new(qualifier.clone(), binding.clone(), rank))
				})
				.clone()
		};

		loop {
			let current = self.state.load_full();
			let (next, entry) = match current.as_deref() {
				None => {
					let entry = make(&mut fresh);
					(CacheState::Single(entry.clone()), entry)
				}
				Some(CacheState::Single(existing)) => {
					if BindingId::of(existing.binding()) == id {
						return (existing.clone(), false);
					}
					let entry = make(&mut fresh);
					let mut map = FxHashMap::default();
					map.insert(BindingId::of(existing.binding()), existing.clone());
					map.insert(id, entry.clone());
					(CacheState::Map(Mutex::new(map)), entry)
				}
				Some(CacheState::Map(map)) => {
					let mut map = map.lock();
					if !self.is_published(&current) {
						continue;
					}
					if let Some(existing) = map.get(&id) {
						return (existing.clone(), false);
					}
					let entry = make(&mut fresh);
					map.insert(id, entry.clone());
					return (entry, true);
				}
			};

			let upgraded = matches!(next, CacheState::Map(_));
			let prev = self.state.compare_and_swap(&current, Some(Arc::new(next)));
			if same_state(&prev, &current) {
				if upgraded {
					trace!(binding = ?id, "entry cache upgraded to map");
				}
				return (entry, true);
			}
		}
	}

	/// Evicts the entry for `binding`, returning it if it was cached.
	pub fn remove(&self, binding: &BindingRef) -> Option<Arc<Entry>> {
		let id = BindingId::of(binding);
		loop {
			let current = self.state.load_full();
			let removed = match current.as_deref() {
				None => return None,
				Some(CacheState::Single(existing)) => {
					if BindingId::of(existing.binding()) != id {
						return None;
					}
					existing.clone()
				}
				Some(CacheState::Map(map)) => {
					let mut map = map.lock();
					if !self.is_published(&current) {
						continue;
					}
					let removed = map.remove(&id)?;
					if map.is_empty() {
						// Holding the map lock: nothing else can replace a map state.
						self.state.store(None);
					}
					return Some(removed);
				}
			};

			let prev = self.state.compare_and_swap(&current, None::<Arc<CacheState>>);
			if same_state(&prev, &current) {
				return Some(removed);
			}
		}
	}

	/// Evicts every entry whose binding fails `keep`.
	pub fn retain(&self, mut keep: impl FnMut(&BindingRef) -> bool) {
		for binding in self.bindings() {
			if !keep(&binding) {
				self.remove(&binding);
			}
		}
	}

	/// Snapshot of the cached bindings.
	pub fn bindings(&self) -> Vec<BindingRef> {
		self.entries()
			.into_iter()
			.map(|entry| entry.binding().clone())
			.collect()
	}

	/// Snapshot of the cached entries.
	pub fn entries(&self) -> Vec<Arc<Entry>> {
		match self.state.load().as_deref() {
			None => Vec::new(),
			Some(CacheState::Single(entry)) => vec![entry.clone()],
			Some(CacheState::Map(map)) => map.lock().values().cloned().collect(),
		}
	}

	pub fn len(&self) -> usize {
		match self.state.load().as_deref() {
			None => 0,
			Some(CacheState::Single(_)) => 1,
			Some(CacheState::Map(map)) => map.lock().len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.state.load().is_none()
	}
}

impl fmt::Debug for EntryCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EntryCache")
			.field("len", &self.len())
			.finish()
	}
}
