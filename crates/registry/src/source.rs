//! Origins of registrations and the protocol they push through.
//!
//! # Role
//!
//! A [`Source`] owns a set of registrations and reports the ones for a
//! requested type to a [`Subscriber`]. Aggregations and watches are the two
//! subscriber kinds; sources never reference the registry.
//!
//! # Invariants
//!
//! - `unsubscribe` removes exactly the registrations the source [`Source::contains`].
//!   - Enforced in: [`retract_contained`].
//!   - Tested by: `tests::test_unsubscribe_retracts_only_owned_bindings`.
//!   - Failure symptom: a detached source's registrations linger in cached views.
//! - Implicit registrations rank below every rank [`DefaultRanking`] produces.
//!   - Enforced in: [`DefaultRanking::rank`] (qualified band ends above [`IMPLICIT_RANK`]).
//!   - Tested by: `tests::test_default_ranking_bands`.
//!   - Failure symptom: a just-in-time component shadows an explicit one.
//! - [`DefaultRanking`] is strictly monotonic in its primary within each band,
//!   over every [`ContextRank`].
//!   - Enforced in: [`DefaultRanking::rank`] (bands live in the wider [`Rank`]).
//!   - Tested by: `tests::test_default_ranking_keeps_context_order_at_extremes`.
//!   - Failure symptom: named registrations of contexts attached at or below
//!     zero come back in pull order instead of context order.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_primitives::Rank;

use crate::binding::{Binding, BindingRef};
use crate::error::RegistryError;
use crate::key::TypeDescriptor;

mod context;
mod dynamic;

pub use context::{ContextBuilder, ContextSource, JitFactory, ProviderContext};
pub use dynamic::DynamicSource;

/// Rank of just-in-time registrations: after everything else.
pub const IMPLICIT_RANK: Rank = Rank::MIN;

/// Rank a provider context is attached at.
///
/// Narrower than [`Rank`] so [`DefaultRanking`] can give each context two
/// disjoint bands without losing order.
pub type ContextRank = i32;

/// Identity of a source; two sources with equal ids are the same source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
	/// Allocates a process-unique id.
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "source#{}", self.0)
	}
}

impl fmt::Debug for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

/// Receiver of registrations pushed by sources.
pub trait Subscriber: Send + Sync {
	/// A registration became visible at `rank`.
	fn add(&self, binding: BindingRef, rank: Rank) -> Result<(), RegistryError>;

	/// A registration went away.
	fn remove(&self, binding: &BindingRef) -> Result<(), RegistryError>;

	/// Registrations this subscriber currently holds.
	fn bindings(&self) -> Vec<BindingRef>;
}

/// One origin of registrations.
pub trait Source: Send + Sync + fmt::Debug {
	fn id(&self) -> SourceId;

	/// Reports every registration for `ty` to `subscriber` and, for pushing
	/// sources, keeps it informed of later changes.
	fn subscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: Arc<dyn Subscriber>,
	) -> Result<(), RegistryError>;

	/// Stops notifications and retracts this source's registrations from
	/// `subscriber`.
	fn unsubscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: &Arc<dyn Subscriber>,
	) -> Result<(), RegistryError>;

	/// Returns true if `binding` belongs to this source.
	fn contains(&self, binding: &Binding) -> bool;

	/// Returns true if this source creates just-in-time registrations for `ty`.
	fn owns_class(&self, ty: &TypeDescriptor) -> bool;
}

/// Removes from `subscriber` every registration `source` contains.
///
/// Keeps going after a failed removal and returns the first error.
pub fn retract_contained(
	source: &dyn Source,
	subscriber: &dyn Subscriber,
) -> Result<(), RegistryError> {
	let mut first_err = None;
	for binding in subscriber.bindings() {
		if source.contains(&binding)
			&& let Err(err) = subscriber.remove(&binding)
			&& first_err.is_none()
		{
			first_err = Some(err);
		}
	}
	first_err.map_or(Ok(()), Err)
}

/// Orders a source's registrations.
pub trait RankingFunction: Send + Sync + fmt::Debug {
	/// Highest rank this function can return.
	fn max_rank(&self) -> Rank;

	fn rank(&self, binding: &Binding) -> Rank;
}

/// Ranks unqualified registrations at `primary` and qualified ones in a
/// band below every primary, so defaults of every source precede all qualified
/// registrations while source order holds within each band.
///
/// | Registration | Rank |
/// |--------------|------|
/// | unqualified | `primary` |
/// | qualified | `primary - 2^32` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRanking {
	primary: ContextRank,
}

impl DefaultRanking {
	/// Distance between the two bands; wider than the whole [`ContextRank`] range.
	pub const QUALIFIED_OFFSET: Rank = 1 << 32;

	pub const fn new(primary: ContextRank) -> Self {
		Self { primary }
	}

	pub const fn primary(&self) -> ContextRank {
		self.primary
	}
}

impl RankingFunction for DefaultRanking {
	fn max_rank(&self) -> Rank {
		Rank::from(self.primary)
	}

	fn rank(&self, binding: &Binding) -> Rank {
		let primary = Rank::from(self.primary);
		if binding.qualifier().is_none() {
			primary
		} else {
			primary - Self::QUALIFIED_OFFSET
		}
	}
}
