//! A source whose registrations change at runtime.

use std::fmt;
use std::sync::Arc;

use beacon_primitives::{Rank, WeakSequence};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::{Source, SourceId, Subscriber, retract_contained};
use crate::binding::{Binding, BindingRef};
use crate::error::RegistryError;
use crate::key::TypeDescriptor;

#[derive(Default)]
struct DynamicState {
	bindings: Vec<(BindingRef, Rank)>,
	subscribers: FxHashMap<TypeDescriptor, WeakSequence<dyn Subscriber>>,
}

/// Mutable source that pushes changes to its subscribers.
///
/// Subscribers are held weakly; dropped ones are pruned when the source next
/// changes. Notifications are delivered under the source's lock, so a
/// subscriber must not call back into the same source.
pub struct DynamicSource {
	id: SourceId,
	state: Mutex<DynamicState>,
}

impl DynamicSource {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			id: SourceId::next(),
			state: Mutex::new(DynamicState::default()),
		})
	}

	/// Adds `binding` at `rank` and notifies subscribers of its type.
	///
	/// Publishing a binding that is already present is a no-op. All live
	/// subscribers are notified; the first failure is returned.
	pub fn publish(&self, binding: BindingRef, rank: Rank) -> Result<(), RegistryError> {
		let mut state = self.state.lock();
		if state.bindings.iter().any(|(b, _)| Arc::ptr_eq(b, &binding)) {
			return Ok(());
		}
		state.bindings.push((binding.clone(), rank));
		let subscribers = live_subscribers(&mut state, binding.ty());
		trace!(source = %self.id, key = %binding.key(), subscribers = subscribers.len(), "publish");

		let mut first_err = None;
		for subscriber in subscribers {
			if let Err(err) = subscriber.add(binding.clone(), rank) {
				first_err.get_or_insert(err);
			}
		}
		first_err.map_or(Ok(()), Err)
	}

	/// Removes `binding` and notifies subscribers of its type.
	///
	/// Returns `Ok(false)` if the binding was not published here.
	pub fn retract(&self, binding: &BindingRef) -> Result<bool, RegistryError> {
		let mut state = self.state.lock();
		let Some(index) = state.bindings.iter().position(|(b, _)| Arc::ptr_eq(b, binding)) else {
			return Ok(false);
		};
		state.bindings.remove(index);
		let subscribers = live_subscribers(&mut state, binding.ty());
		trace!(source = %self.id, key = %binding.key(), subscribers = subscribers.len(), "retract");

		let mut first_err = None;
		for subscriber in subscribers {
			if let Err(err) = subscriber.remove(binding) {
				first_err.get_or_insert(err);
			}
		}
		first_err.map_or(Ok(true), Err)
	}

	/// Snapshot of the published registrations with their ranks.
	pub fn bindings(&self) -> Vec<(BindingRef, Rank)> {
		self.state.lock().bindings.clone()
	}

	/// Number of live subscribers across all types.
	pub fn subscriber_count(&self) -> usize {
		let mut state = self.state.lock();
		state.subscribers.retain(|_, subs| {
			subs.prune();
			!subs.is_empty()
		});
		state.subscribers.values().map(WeakSequence::len).sum()
	}
}

fn live_subscribers(state: &mut DynamicState, ty: &TypeDescriptor) -> Vec<Arc<dyn Subscriber>> {
	let Some(subs) = state.subscribers.get_mut(ty) else {
		return Vec::new();
	};
	subs.prune();
	let live = subs.live();
	if subs.is_empty() {
		state.subscribers.remove(ty);
	}
	live
}

impl Source for DynamicSource {
	fn id(&self) -> SourceId {
		self.id
	}

	fn subscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		let mut state = self.state.lock();
		state.subscribers.entry(ty.clone()).or_default().push(&subscriber);
		for (binding, rank) in state.bindings.iter().filter(|(b, _)| b.ty() == ty) {
			subscriber.add(binding.clone(), *rank)?;
		}
		Ok(())
	}

	fn unsubscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: &Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		{
			let mut state = self.state.lock();
			if let Some(subs) = state.subscribers.get_mut(ty) {
				subs.remove(subscriber);
				if subs.is_empty() {
					state.subscribers.remove(ty);
				}
			}
		}
		retract_contained(self, &**subscriber)
	}

	fn contains(&self, binding: &Binding) -> bool {
		self.state
			.lock()
			.bindings
			.iter()
			.any(|(b, _)| std::ptr::eq(&**b, binding))
	}

	fn owns_class(&self, _ty: &TypeDescriptor) -> bool {
		false
	}
}

impl fmt::Debug for DynamicSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DynamicSource")
			.field("id", &self.id)
			.finish_non_exhaustive()
	}
}
