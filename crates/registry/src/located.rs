//! Live, read-only sequences returned by [`crate::Registry::locate`].

use std::fmt;
use std::sync::Arc;

use crate::aggregate::{AggregationCursor, RankedAggregation};
use crate::cache::EntryCache;
use crate::entry::Entry;
use crate::error::RegistryError;
use crate::key::{QualifierFilter, Query};

/// Every registration matching a query, in rank order.
///
/// The sequence is live: each [`Located::iter`] reflects sources added or
/// removed since the previous one. Entries are cached per sequence (and
/// shared by its clones), so the same registration always yields the same
/// [`Entry`].
#[derive(Clone)]
pub struct Located {
	query: Query,
	aggregation: Arc<RankedAggregation>,
	cache: Arc<EntryCache>,
}

impl Located {
	pub(crate) fn new(query: Query, aggregation: Arc<RankedAggregation>) -> Self {
		let cache = Arc::new(EntryCache::new());
		aggregation.add_cache(&cache);
		Self {
			query,
			aggregation,
			cache,
		}
	}

	pub fn query(&self) -> &Query {
		&self.query
	}

	/// Iterates the current matches, pulling sources as far as needed.
	pub fn iter(&self) -> LocatedIter<'_> {
		LocatedIter {
			filter: self.query.filter(),
			cache: &self.cache,
			cursor: self.aggregation.cursor(),
			failed: false,
		}
	}

	/// Collects a snapshot of the current matches.
	pub fn entries(&self) -> Result<Vec<Arc<Entry>>, RegistryError> {
		self.iter().collect()
	}

	/// Highest-ranked match, if any.
	pub fn first(&self) -> Option<Result<Arc<Entry>, RegistryError>> {
		self.iter().next()
	}
}

impl<'a> IntoIterator for &'a Located {
	type Item = Result<Arc<Entry>, RegistryError>;
	type IntoIter = LocatedIter<'a>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

impl fmt::Debug for Located {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Located")
			.field("query", &self.query)
			.field("cached", &self.cache.len())
			.finish()
	}
}

/// Iterator over a [`Located`] sequence.
///
/// Stops after yielding an error; a fresh [`Located::iter`] retries.
pub struct LocatedIter<'a> {
	filter: &'a QualifierFilter,
	cache: &'a EntryCache,
	cursor: AggregationCursor,
	failed: bool,
}

impl Iterator for LocatedIter<'_> {
	type Item = Result<Arc<Entry>, RegistryError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}
		loop {
			match self.cursor.next()? {
				Ok((binding, rank)) => {
					if self.filter.matches(&binding) {
						let qualifier = self.filter.report(&binding);
						return Some(Ok(self.cache.get_or_create(qualifier, &binding, rank)));
					}
				}
				Err(err) => {
					self.failed = true;
					return Some(Err(err));
				}
			}
		}
	}
}
