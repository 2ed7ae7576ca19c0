//! Per-type merge of every source's registrations.
//!
//! # Role
//!
//! A [`RankedAggregation`] turns "all registrations of type T across the
//! current and future sources" into one rank-ordered sequence without asking
//! every source up front.
//!
//! # Mental Model
//!
//! Sources wait in `pending`, ordered by the highest rank they can produce.
//! Registrations already reported live in `realized`. A cursor may only hand
//! out the next realized item once no pending source could produce something
//! ranked at or above it; until then the top pending source is pulled
//! (subscribed) and removed from `pending`.
//!
//! ```text
//! pending:  [S3(3)] [S0(0)]
//! realized: [a(5)] [b(3)] [c(1)]
//!            ^ cursor: next rank 5 > 3, no pull needed
//! ```
//!
//! # Invariants
//!
//! - The realized prefix a cursor has walked is correctly ordered relative
//!   to every pending source.
//!   - Enforced in: [`RankedAggregation::pull`] (pull while top pending >= next realized).
//!   - Tested by: `tests::test_pulls_only_what_iteration_needs`, `tests::test_equal_rank_pulls_before_realized`.
//!   - Failure symptom: a higher-ranked registration appears after a lower one.
//! - A pending source is removed only after its subscription completed.
//!   - Enforced in: [`RankedAggregation::pull`] (subscribe under the pending lock).
//!   - Tested by: `tests::test_failed_subscribe_stays_pending`.
//!   - Failure symptom: a concurrent cursor skips a source's registrations.
//! - A registration is realized at most once.
//!   - Enforced in: [`Subscriber::add`] for [`RankedAggregation`] (identity check).
//!   - Tested by: `tests::test_duplicate_add_is_ignored`.
//!   - Failure symptom: the same component is yielded twice.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use beacon_primitives::{Rank, RankedCursor, RankedList, WeakSequence};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::binding::BindingRef;
use crate::cache::EntryCache;
use crate::error::RegistryError;
use crate::key::TypeDescriptor;
use crate::source::{Source, Subscriber};

/// Lazily populated, globally ranked view of one type's registrations.
pub struct RankedAggregation {
	ty: TypeDescriptor,
	realized: ArcSwap<RankedList<BindingRef>>,
	pending: Mutex<RankedList<Arc<dyn Source>>>,
	/// Mirror of `pending.len()` so drained aggregations skip the lock.
	pending_len: AtomicUsize,
	caches: Mutex<WeakSequence<EntryCache>>,
}

impl RankedAggregation {
	/// Creates an aggregation with every source in `sources` pending.
	pub fn new(ty: TypeDescriptor, sources: &RankedList<Arc<dyn Source>>) -> Arc<Self> {
		Arc::new(Self {
			ty,
			realized: ArcSwap::from_pointee(RankedList::new()),
			pending_len: AtomicUsize::new(sources.len()),
			pending: Mutex::new(sources.clone()),
			caches: Mutex::new(WeakSequence::new()),
		})
	}

	pub fn ty(&self) -> &TypeDescriptor {
		&self.ty
	}

	/// Queues `source`; it is subscribed only once iteration reaches `rank`.
	///
	/// `rank` must be at least the highest rank the source reports.
	pub fn add_source(&self, source: Arc<dyn Source>, rank: Rank) {
		let mut pending = self.pending.lock();
		pending.insert(source, rank);
		self.pending_len.store(pending.len(), Ordering::Release);
	}

	/// Detaches `source`, retracting whatever it contributed.
	///
	/// A source that was never pulled is simply dropped from the queue.
	pub fn remove_source(self: &Arc<Self>, source: &Arc<dyn Source>) -> Result<(), RegistryError> {
		let id = source.id();
		let mut pending = self.pending.lock();
		if pending.remove_by(|s| s.id() == id).is_some() {
			self.pending_len.store(pending.len(), Ordering::Release);
			return Ok(());
		}
		let subscriber: Arc<dyn Subscriber> = self.clone();
		let result = source.unsubscribe(&self.ty, &subscriber);
		drop(pending);
		self.flush_caches();
		result
	}

	/// Drops every pending source and realized registration.
	pub fn clear(&self) {
		let mut pending = self.pending.lock();
		pending.clear();
		self.pending_len.store(0, Ordering::Release);
		self.realized.store(Arc::new(RankedList::new()));
		drop(pending);
		self.flush_caches();
	}

	/// Registers `cache` for eviction when registrations go away.
	pub fn add_cache(&self, cache: &Arc<EntryCache>) {
		self.caches.lock().push(cache);
	}

	/// Number of sources not yet pulled.
	pub fn pending_len(&self) -> usize {
		self.pending_len.load(Ordering::Acquire)
	}

	/// Snapshot of the realized registrations in rank order.
	pub fn bindings(&self) -> Vec<(BindingRef, Rank)> {
		self.realized
			.load()
			.iter()
			.map(|(binding, rank)| (binding.clone(), rank))
			.collect()
	}

	pub fn cursor(self: &Arc<Self>) -> AggregationCursor {
		AggregationCursor {
			aggregation: self.clone(),
			pos: RankedCursor::new(),
		}
	}

	/// Subscribes pending sources until none could precede the cursor's next item.
	pub(crate) fn pull(self: &Arc<Self>, cursor: &RankedCursor) -> Result<(), RegistryError> {
		if self.pending_len.load(Ordering::Acquire) == 0 {
			return Ok(());
		}
		let mut pending = self.pending.lock();
		loop {
			let Some((source, rank)) = pending.first() else {
				break;
			};
			let next = cursor.peek_next_rank(&**self.realized.load());
			if next.is_some_and(|next| rank < next) {
				break;
			}
			let source = source.clone();
			let subscriber: Arc<dyn Subscriber> = self.clone();
			if let Err(err) = source.subscribe(&self.ty, subscriber.clone()) {
				if let Err(cleanup) = source.unsubscribe(&self.ty, &subscriber) {
					debug!(ty = %self.ty, source = %source.id(), error = %cleanup, "retracting partial subscription failed");
				}
				return Err(err);
			}
			pending.remove_first();
			self.pending_len.store(pending.len(), Ordering::Release);
			trace!(ty = %self.ty, source = %source.id(), rank, remaining = pending.len(), "pulled source");
		}
		Ok(())
	}

	/// Evicts cached entries whose registration is no longer realized.
	fn flush_caches(&self) {
		let realized = self.realized.load_full();
		let caches = {
			let mut caches = self.caches.lock();
			caches.prune();
			caches.live()
		};
		for cache in caches {
			cache.retain(|binding| realized.contains_same(binding));
		}
	}
}

impl Subscriber for RankedAggregation {
	fn add(&self, binding: BindingRef, rank: Rank) -> Result<(), RegistryError> {
		self.realized.rcu(|current| {
			let mut next = RankedList::clone(current);
			if !next.contains_same(&binding) {
				next.insert(binding.clone(), rank);
			}
			next
		});
		Ok(())
	}

	fn remove(&self, binding: &BindingRef) -> Result<(), RegistryError> {
		let mut removed = false;
		self.realized.rcu(|current| {
			let mut next = RankedList::clone(current);
			removed = next.remove_same(binding);
			next
		});
		if removed {
			for cache in self.caches.lock().live() {
				cache.remove(binding);
			}
		}
		Ok(())
	}

	fn bindings(&self) -> Vec<BindingRef> {
		self.realized.load().items().cloned().collect()
	}
}

impl fmt::Debug for RankedAggregation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RankedAggregation")
			.field("ty", &self.ty)
			.field("realized", &self.realized.load().len())
			.field("pending", &self.pending_len())
			.finish()
	}
}

/// Resumable position in a [`RankedAggregation`].
///
/// Every step re-reads the current realized list, so registrations added
/// behind the cursor are still seen and removed ones are skipped.
pub struct AggregationCursor {
	aggregation: Arc<RankedAggregation>,
	pos: RankedCursor,
}

impl AggregationCursor {
	/// Returns true if another registration is available, pulling sources as needed.
	pub fn has_next(&self) -> Result<bool, RegistryError> {
		self.aggregation.pull(&self.pos)?;
		Ok(self.pos.has_next(&**self.aggregation.realized.load()))
	}

	pub fn aggregation(&self) -> &Arc<RankedAggregation> {
		&self.aggregation
	}
}

impl Iterator for AggregationCursor {
	type Item = Result<(BindingRef, Rank), RegistryError>;

	fn next(&mut self) -> Option<Self::Item> {
		if let Err(err) = self.aggregation.pull(&self.pos) {
			return Some(Err(err));
		}
		let realized = self.aggregation.realized.load();
		self.pos
			.next(&**realized)
			.map(|(binding, rank)| Ok((binding.clone(), rank)))
	}
}
