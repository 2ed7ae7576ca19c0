//! Rank-ordered sequences.
//!
//! # Role
//!
//! [`RankedList`] keeps items sorted by descending [`Rank`]. Items with equal
//! rank keep their insertion order. Every insertion is tagged with a sequence
//! number, so `(rank desc, seq asc)` is a total order over the list and a
//! [`RankedCursor`] can find its place again after the list has changed.
//!
//! # Invariants
//!
//! - Slots are sorted by `(rank desc, seq asc)` after every mutation.
//!   - Enforced in: [`RankedList::insert`].
//!   - Tested by: `tests::prop_insert_keeps_rank_order`.
//!   - Failure symptom: lower ranked items returned before higher ranked ones.
//! - A cursor never yields the same slot twice and never skips a slot that
//!   sorts after its last position, even when the list is swapped underneath it.
//!   - Enforced in: [`RankedCursor::next`] (re-seek by position).
//!   - Tested by: `tests::test_cursor_resyncs_after_insert_and_remove`.
//!   - Failure symptom: duplicated or missing items during live iteration.

use std::sync::Arc;

/// Ordering priority; higher ranks sort earlier.
pub type Rank = i64;

#[derive(Clone, Debug)]
struct Slot<T> {
	rank: Rank,
	seq: u64,
	item: T,
}

impl<T> Slot<T> {
	fn position(&self) -> Position {
		Position {
			rank: self.rank,
			seq: self.seq,
		}
	}
}

/// Location of a slot in the `(rank desc, seq asc)` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Position {
	rank: Rank,
	seq: u64,
}

impl Position {
	/// True if a slot at `other` sorts at or before this position.
	fn covers(self, other: Position) -> bool {
		other.rank > self.rank || (other.rank == self.rank && other.seq <= self.seq)
	}
}

/// Sequence of items ordered by descending rank, stable among equal ranks.
#[derive(Clone, Debug)]
pub struct RankedList<T> {
	slots: Vec<Slot<T>>,
	next_seq: u64,
}

impl<T> Default for RankedList<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> RankedList<T> {
	/// Creates an empty list.
	pub const fn new() -> Self {
		Self {
			slots: Vec::new(),
			next_seq: 0,
		}
	}

	/// Inserts `item` after every existing item whose rank is `>= rank`.
	pub fn insert(&mut self, item: T, rank: Rank) {
		let index = self.slots.partition_point(|slot| slot.rank >= rank);
		let seq = self.next_seq;
		self.next_seq += 1;
		self.slots.insert(index, Slot { rank, seq, item });
	}

	/// Removes the first item matching `pred`, returning it with its rank.
	pub fn remove_by(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<(T, Rank)> {
		let index = self.slots.iter().position(|slot| pred(&slot.item))?;
		let slot = self.slots.remove(index);
		Some((slot.item, slot.rank))
	}

	/// Removes and returns the highest ranked item.
	pub fn remove_first(&mut self) -> Option<(T, Rank)> {
		if self.slots.is_empty() {
			return None;
		}
		let slot = self.slots.remove(0);
		Some((slot.item, slot.rank))
	}

	/// Returns true if any item matches `pred`.
	pub fn contains_by(&self, pred: impl FnMut(&T) -> bool) -> bool {
		self.slots.iter().map(|slot| &slot.item).any(pred)
	}

	/// Returns the highest ranked item.
	pub fn first(&self) -> Option<(&T, Rank)> {
		self.slots.first().map(|slot| (&slot.item, slot.rank))
	}

	/// Returns the rank of the highest ranked item.
	pub fn first_rank(&self) -> Option<Rank> {
		self.slots.first().map(|slot| slot.rank)
	}

	pub fn len(&self) -> usize {
		self.slots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	/// Removes every item. Sequence numbers keep increasing.
	pub fn clear(&mut self) {
		self.slots.clear();
	}

	/// Iterates `(item, rank)` pairs in rank order.
	pub fn iter(&self) -> impl Iterator<Item = (&T, Rank)> + '_ {
		self.slots.iter().map(|slot| (&slot.item, slot.rank))
	}

	/// Iterates items in rank order.
	pub fn items(&self) -> impl Iterator<Item = &T> + '_ {
		self.slots.iter().map(|slot| &slot.item)
	}

	/// Returns a borrowing cursor positioned before the first item.
	pub fn cursor(&self) -> Cursor<'_, T> {
		Cursor {
			list: self,
			pos: RankedCursor::new(),
		}
	}
}

impl<U: ?Sized> RankedList<Arc<U>> {
	/// Removes the first item that is the same allocation as `item`.
	pub fn remove_same(&mut self, item: &Arc<U>) -> bool {
		self.remove_by(|candidate| Arc::ptr_eq(candidate, item)).is_some()
	}

	/// Returns true if the same allocation as `item` is present.
	pub fn contains_same(&self, item: &Arc<U>) -> bool {
		self.contains_by(|candidate| Arc::ptr_eq(candidate, item))
	}
}

/// Detached cursor over a [`RankedList`].
///
/// The cursor only stores the position of the last consumed slot, so the same
/// cursor can be driven against successive versions of a list (for example
/// snapshots loaded from an `ArcSwap`). Items inserted ahead of the position
/// are not revisited; items inserted behind it are picked up.
#[derive(Clone, Copy, Debug, Default)]
pub struct RankedCursor {
	last: Option<Position>,
	hint: usize,
}

impl RankedCursor {
	/// Creates a cursor positioned before the first item.
	pub const fn new() -> Self {
		Self {
			last: None,
			hint: 0,
		}
	}

	fn next_index<T>(&self, list: &RankedList<T>) -> usize {
		let Some(last) = self.last else {
			return 0;
		};
		// Fast path: the list has not moved since the previous step.
		if let Some(prev) = self.hint.checked_sub(1).and_then(|i| list.slots.get(i))
			&& prev.position() == last
		{
			return self.hint;
		}
		list.slots.partition_point(|slot| last.covers(slot.position()))
	}

	/// Returns the rank of the next unconsumed item, or `None` when exhausted.
	pub fn peek_next_rank<T>(&self, list: &RankedList<T>) -> Option<Rank> {
		list.slots.get(self.next_index(list)).map(|slot| slot.rank)
	}

	/// Returns true if an unconsumed item remains.
	pub fn has_next<T>(&self, list: &RankedList<T>) -> bool {
		self.next_index(list) < list.slots.len()
	}

	/// Consumes and returns the next item with its rank.
	pub fn next<'a, T>(&mut self, list: &'a RankedList<T>) -> Option<(&'a T, Rank)> {
		let index = self.next_index(list);
		let slot = list.slots.get(index)?;
		self.last = Some(slot.position());
		self.hint = index + 1;
		Some((&slot.item, slot.rank))
	}
}

/// Borrowing cursor returned by [`RankedList::cursor`].
pub struct Cursor<'a, T> {
	list: &'a RankedList<T>,
	pos: RankedCursor,
}

impl<T> Cursor<'_, T> {
	/// Returns the rank of the next unconsumed item, or `None` when exhausted.
	pub fn peek_next_rank(&self) -> Option<Rank> {
		self.pos.peek_next_rank(self.list)
	}
}

impl<'a, T> Iterator for Cursor<'a, T> {
	type Item = (&'a T, Rank);

	fn next(&mut self) -> Option<Self::Item> {
		self.pos.next(self.list)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = self.list.len() - self.pos.next_index(self.list);
		(remaining, Some(remaining))
	}
}
