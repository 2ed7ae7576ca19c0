//! Ranked, live, multi-source component registry.
//!
//! Sources contribute typed, qualified registrations; the [`Registry`]
//! merges them per type into rank-ordered [`Located`] sequences that stay
//! current as sources come and go, and pushes changes to watchers through
//! a [`Mediator`].
//!
//! # Modules
//!
//! - [`key`] - type descriptors, qualifiers and queries
//! - [`binding`] - registrations and their providers
//! - [`entry`] / [`cache`] - lazily realized, identity-cached wrappers
//! - [`source`] - the source protocol, ranking, and the bundled sources
//! - [`aggregate`] - per-type lazy merge across sources
//! - [`registry`] - the facade
//! - [`watch`] - push notifications
//!
//! # Invariants
//!
//! - Iteration yields sources by descending rank, ties in add order.
//! - A source is subscribed for a type only when iteration needs it.
//! - A provider runs at most once per registration and sequence.
//! - Views, aggregations and watches nobody references are pruned on the
//!   next mutation.
//!
//! See `invariants.rs` for the executable versions.

pub mod aggregate;
pub mod binding;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod located;
pub mod registry;
pub mod source;
pub mod watch;

pub use aggregate::{AggregationCursor, RankedAggregation};
pub use beacon_primitives::Rank;
pub use binding::{Binding, BindingId, BindingRef, Provider, ProvisionError, Value};
pub use cache::EntryCache;
pub use config::RegistryConfig;
pub use entry::Entry;
pub use error::{MediatorError, RegistryError};
pub use key::{QualifiedKey, Qualifier, QualifierFilter, Query, TypeDescriptor};
pub use located::{Located, LocatedIter};
pub use registry::Registry;
pub use source::{
	ContextBuilder, ContextRank, ContextSource, DefaultRanking, DynamicSource, IMPLICIT_RANK,
	JitFactory, ProviderContext, RankingFunction, Source, SourceId, Subscriber,
};
pub use watch::{Mediator, WatchHandle, WatchId};

#[cfg(test)]
mod invariants;
#[cfg(test)]
pub(crate) mod test_fixtures;
