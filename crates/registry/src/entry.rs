//! Lazily realized wrappers around registrations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use beacon_primitives::Rank;
use parking_lot::Mutex;

use crate::binding::{BindingRef, ProvisionError, Value};
use crate::key::{QualifiedKey, Qualifier};

/// Consumer-facing view of one registration.
///
/// The value is produced on the first successful [`Entry::value`] call and
/// memoized; concurrent callers wait for that call and observe its result.
/// A failed provision is not memoized.
pub struct Entry {
	qualifier: Option<Qualifier>,
	binding: BindingRef,
	rank: Rank,
	value: Mutex<Option<Value>>,
}

impl Entry {
	pub(crate) fn new(qualifier: Option<Qualifier>, binding: BindingRef, rank: Rank) -> Self {
		Self {
			qualifier,
			binding,
			rank,
			value: Mutex::new(None),
		}
	}

	/// Qualifier this entry is reported under for its query.
	pub fn qualifier(&self) -> Option<&Qualifier> {
		self.qualifier.as_ref()
	}

	pub fn key(&self) -> &QualifiedKey {
		self.binding.key()
	}

	pub fn binding(&self) -> &BindingRef {
		&self.binding
	}

	pub fn rank(&self) -> Rank {
		self.rank
	}

	/// Returns the component value, invoking the provider at most once.
	pub fn value(&self) -> Result<Value, ProvisionError> {
		let mut slot = self.value.lock();
		if let Some(value) = &*slot {
			return Ok(value.clone());
		}
		let value = self.binding.provide()?;
		*slot = Some(value.clone());
		Ok(value)
	}

	/// Returns the value downcast to `T`, or `None` if it has another type.
	pub fn value_as<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>, ProvisionError> {
		Ok(self.value()?.downcast::<T>().ok())
	}

	/// Returns true once a value has been produced.
	pub fn is_realized(&self) -> bool {
		self.value.lock().is_some()
	}
}

impl fmt::Debug for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("qualifier", &self.qualifier)
			.field("key", self.binding.key())
			.field("rank", &self.rank)
			.field("realized", &self.value.try_lock().map(|slot| slot.is_some()))
			.finish()
	}
}
