//! The registry facade.
//!
//! # Role
//!
//! Owns the attached sources, the per-type aggregations built from them and
//! the watch subscriptions. Every mutation happens under one lock; lookups of
//! existing aggregations are lock-free.
//!
//! # Mental Model
//!
//! - `sources`: attached sources in rank order, the template for new aggregations.
//! - `aggregations`: weakly held, keyed by type; [`Located`] sequences keep them alive.
//! - `watches`: each subscription linked to its watcher's lifetime.
//!
//! Adding a source queues it on every live aggregation (no subscription yet)
//! and subscribes every live watch to it. Removing a source detaches it from
//! both.
//!
//! # Invariants
//!
//! - A source id is attached at most once.
//!   - Enforced in: [`Registry::add_source`].
//!   - Tested by: `tests::test_duplicate_add_and_unknown_remove_are_no_ops`.
//!   - Failure symptom: registrations appear twice.
//! - Aggregations are created under the lock, so none misses a concurrent add.
//!   - Enforced in: [`Registry::locate`] (double-checked creation).
//!   - Tested by: `tests::test_concurrent_locate_and_add`.
//!   - Failure symptom: a live sequence never sees a source that was added.
//! - Dead aggregations and watches do not accumulate.
//!   - Enforced in: `Registry::prune` (called by every mutation).
//!   - Tested by: `tests::test_dropped_views_and_watchers_are_pruned`.
//!   - Failure symptom: memory grows with every distinct query type.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use beacon_primitives::{LinkedSequence, Rank, RankedList, WeakValues};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::aggregate::RankedAggregation;
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::key::{Query, TypeDescriptor};
use crate::located::Located;
use crate::source::{
	ContextRank, ContextSource, DefaultRanking, ProviderContext, Source, SourceId, Subscriber,
};
use crate::watch::{Mediator, WatchHandle, WatchId, WatchedBindings};

type AggregationMap = WeakValues<TypeDescriptor, RankedAggregation>;

struct WatchSlot {
	id: WatchId,
	ty: TypeDescriptor,
	subscriber: Arc<dyn Subscriber>,
}

struct RegistryState {
	sources: RankedList<Arc<dyn Source>>,
	watches: LinkedSequence<WatchSlot>,
	next_watch: u64,
}

/// Ranked, live, multi-source component registry.
pub struct Registry {
	config: RegistryConfig,
	state: Mutex<RegistryState>,
	aggregations: ArcSwap<AggregationMap>,
}

fn keep_first(slot: &mut Option<RegistryError>, result: Result<(), RegistryError>) {
	if let Err(err) = result
		&& slot.is_none()
	{
		*slot = Some(err);
	}
}

impl Registry {
	pub fn new() -> Self {
		Self::with_config(RegistryConfig::default())
	}

	pub fn with_config(config: RegistryConfig) -> Self {
		Self {
			config,
			state: Mutex::new(RegistryState {
				sources: RankedList::new(),
				watches: LinkedSequence::new(),
				next_watch: 0,
			}),
			aggregations: ArcSwap::from_pointee(AggregationMap::new()),
		}
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	/// Returns a live sequence of every registration matching `query`.
	pub fn locate(&self, query: Query) -> Located {
		if let Some(aggregation) = self.aggregations.load().get(query.ty()) {
			return Located::new(query, aggregation);
		}

		let state = self.state.lock();
		if let Some(aggregation) = self.aggregations.load().get(query.ty()) {
			return Located::new(query, aggregation);
		}
		let aggregation = RankedAggregation::new(query.ty().clone(), &state.sources);
		self.aggregations.rcu(|current| {
			let mut next = AggregationMap::clone(current);
			next.insert(query.ty().clone(), &aggregation);
			next
		});
		drop(state);
		debug!(ty = %query.ty(), "aggregation created");
		Located::new(query, aggregation)
	}

	/// Attaches `source` at `rank`.
	///
	/// `rank` must be at least the highest rank the source reports. Returns
	/// `Ok(false)` if a source with the same id is already attached. Watches
	/// are subscribed to the new source; the first watch failure is returned
	/// after the source has been attached.
	pub fn add_source(&self, source: Arc<dyn Source>, rank: Rank) -> Result<bool, RegistryError> {
		let mut state = self.state.lock();
		let id = source.id();
		if state.sources.contains_by(|s| s.id() == id) {
			return Ok(false);
		}
		self.prune(&mut state);

		state.sources.insert(source.clone(), rank);
		for aggregation in self.aggregations.load().values() {
			aggregation.add_source(source.clone(), rank);
		}

		let mut first_err = None;
		for slot in state.watches.iter() {
			let result = source.subscribe(&slot.ty, slot.subscriber.clone());
			if let Err(err) = &result {
				warn!(source = %id, watch = slot.id.get(), error = %err, "watch subscription failed");
			}
			keep_first(&mut first_err, result);
		}
		debug!(source = %id, rank, sources = state.sources.len(), "source added");
		first_err.map_or(Ok(true), Err)
	}

	/// Detaches the source with `id`.
	///
	/// Returns `Ok(false)` if no such source is attached. Detaching always
	/// completes; the first failure reported along the way is returned.
	pub fn remove_source(&self, id: SourceId) -> Result<bool, RegistryError> {
		let mut state = self.state.lock();
		self.remove_locked(&mut state, id)
	}

	fn remove_locked(&self, state: &mut RegistryState, id: SourceId) -> Result<bool, RegistryError> {
		let Some((source, _)) = state.sources.remove_by(|s| s.id() == id) else {
			return Ok(false);
		};
		self.prune(state);

		let mut first_err = None;
		for aggregation in self.aggregations.load().values() {
			let result = aggregation.remove_source(&source);
			if let Err(err) = &result {
				warn!(source = %id, ty = %aggregation.ty(), error = %err, "detaching source from aggregation failed");
			}
			keep_first(&mut first_err, result);
		}
		for slot in state.watches.iter() {
			let result = source.unsubscribe(&slot.ty, &slot.subscriber);
			if let Err(err) = &result {
				warn!(source = %id, watch = slot.id.get(), error = %err, "detaching source from watch failed");
			}
			keep_first(&mut first_err, result);
		}
		debug!(source = %id, sources = state.sources.len(), "source removed");
		first_err.map_or(Ok(true), Err)
	}

	/// Attaches `context`, ranking its registrations with [`DefaultRanking`] at `rank`.
	pub fn add_context(
		&self,
		context: &Arc<ProviderContext>,
		rank: ContextRank,
	) -> Result<bool, RegistryError> {
		let source = ContextSource::with_config(
			context.clone(),
			Arc::new(DefaultRanking::new(rank)),
			&self.config,
		);
		self.add_source(Arc::new(source), Rank::from(rank))
	}

	/// Attaches `context` at the configured default rank.
	pub fn add_context_default(
		&self,
		context: &Arc<ProviderContext>,
	) -> Result<bool, RegistryError> {
		self.add_context(context, self.config.default_rank)
	}

	pub fn remove_context(&self, context: &ProviderContext) -> Result<bool, RegistryError> {
		self.remove_source(context.id())
	}

	/// Detaches every source.
	pub fn clear(&self) -> Result<(), RegistryError> {
		let mut state = self.state.lock();
		let ids: Vec<SourceId> = state.sources.items().map(|s| s.id()).collect();
		let mut first_err = None;
		for id in ids {
			keep_first(&mut first_err, self.remove_locked(&mut state, id).map(drop));
		}
		first_err.map_or(Ok(()), Err)
	}

	/// Subscribes `mediator` to registrations matching `query` on behalf of
	/// `watcher`.
	///
	/// Existing matches are announced before this returns. The subscription
	/// ends with [`Registry::unwatch`] or when `watcher` is dropped. If a
	/// source fails, the partial subscription is rolled back and the error
	/// returned.
	pub fn watch<W>(
		&self,
		query: Query,
		mediator: Arc<dyn Mediator<W>>,
		watcher: &Arc<W>,
	) -> Result<WatchHandle, RegistryError>
	where
		W: Send + Sync + 'static,
	{
		let subscriber: Arc<dyn Subscriber> =
			Arc::new(WatchedBindings::new(query.clone(), mediator, watcher));
		let mut state = self.state.lock();
		self.prune(&mut state);

		for source in state.sources.items() {
			if let Err(err) = source.subscribe(query.ty(), subscriber.clone()) {
				for attached in state.sources.items() {
					if let Err(cleanup) = attached.unsubscribe(query.ty(), &subscriber) {
						debug!(source = %attached.id(), error = %cleanup, "rolling back watch failed");
					}
				}
				return Err(err);
			}
		}

		state.next_watch += 1;
		let id = WatchId(state.next_watch);
		state.watches.link(
			WatchSlot {
				id,
				ty: query.ty().clone(),
				subscriber,
			},
			watcher,
		);
		debug!(watch = id.get(), %query, "watch added");
		Ok(WatchHandle { id, query })
	}

	/// Ends a watch; live entries are announced as removed.
	///
	/// Returns `Ok(false)` if the watch already ended.
	pub fn unwatch(&self, handle: &WatchHandle) -> Result<bool, RegistryError> {
		let mut state = self.state.lock();
		let Some(slot) = state.watches.unlink_by(|slot| slot.id == handle.id) else {
			return Ok(false);
		};
		let mut first_err = None;
		for source in state.sources.items() {
			keep_first(&mut first_err, source.unsubscribe(&slot.ty, &slot.subscriber));
		}
		debug!(watch = handle.id.get(), query = %handle.query, "watch removed");
		first_err.map_or(Ok(true), Err)
	}

	/// Attached source ids in rank order.
	pub fn sources(&self) -> Vec<SourceId> {
		self.state.lock().sources.items().map(|s| s.id()).collect()
	}

	pub fn len(&self) -> usize {
		self.state.lock().sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state.lock().sources.is_empty()
	}

	/// Number of watches whose watcher is still alive.
	pub fn watch_count(&self) -> usize {
		self.state.lock().watches.iter().count()
	}

	/// Number of aggregations some live sequence still references.
	pub fn aggregation_count(&self) -> usize {
		self.aggregations.load().values().len()
	}

	/// Drops dead aggregations and tears down watches whose watcher is gone.
	fn prune(&self, state: &mut RegistryState) {
		if self.aggregations.load().has_dead() {
			self.aggregations.rcu(|current| {
				let mut next = AggregationMap::clone(current);
				next.prune();
				next
			});
		}
		for slot in state.watches.prune() {
			for source in state.sources.items() {
				if let Err(err) = source.unsubscribe(&slot.ty, &slot.subscriber) {
					debug!(source = %source.id(), watch = slot.id.get(), error = %err, "dropping dead watch failed");
				}
			}
			debug!(watch = slot.id.get(), "watcher dropped");
		}
	}
}

impl Default for Registry {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("config", &self.config)
			.field("sources", &self.sources())
			.field("aggregations", &self.aggregation_count())
			.finish()
	}
}
