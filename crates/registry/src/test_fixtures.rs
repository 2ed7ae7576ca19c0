//! Shared fixtures for registry tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use beacon_primitives::Rank;
use parking_lot::Mutex;

use crate::binding::{Binding, BindingRef, ProvisionError, Value};
use crate::entry::Entry;
use crate::error::{MediatorError, RegistryError};
use crate::key::{QualifiedKey, Qualifier, TypeDescriptor};
use crate::located::Located;
use crate::source::{ProviderContext, Source, SourceId, Subscriber};
use crate::watch::Mediator;

/// The abstract component type every fixture binds.
pub(crate) fn bean() -> TypeDescriptor {
	TypeDescriptor::abstract_type("Bean")
}

pub(crate) fn text(label: &str) -> Value {
	Arc::new(label.to_string())
}

pub(crate) fn named_bean(name: &str) -> BindingRef {
	Binding::instance(QualifiedKey::named(bean(), name), text(name))
}

pub(crate) fn default_bean(label: &str) -> BindingRef {
	Binding::instance(QualifiedKey::unqualified(bean()), text(label))
}

/// `A`, `-`, `Z`.
pub(crate) fn parent() -> Arc<ProviderContext> {
	ProviderContext::builder()
		.add(named_bean("A"))
		.add(named_bean("-"))
		.add(named_bean("Z"))
		.build()
}

/// `M1`, an unqualified default, `N1`.
pub(crate) fn child1() -> Arc<ProviderContext> {
	ProviderContext::builder()
		.add(named_bean("M1"))
		.add(default_bean("default-1"))
		.add(named_bean("N1"))
		.build()
}

/// A single hidden registration.
pub(crate) fn child2() -> Arc<ProviderContext> {
	ProviderContext::builder()
		.bind_hidden(
			QualifiedKey::named(bean(), "HIDDEN"),
			|| -> Result<Value, ProvisionError> { Ok(text("HIDDEN")) },
		)
		.build()
}

/// `M3`, an unqualified default, `N3`.
pub(crate) fn child3() -> Arc<ProviderContext> {
	ProviderContext::builder()
		.add(named_bean("M3"))
		.add(default_bean("default-3"))
		.add(named_bean("N3"))
		.build()
}

/// Reported qualifier value of each entry, `-` for unqualified reports.
pub(crate) fn names(located: &Located) -> Vec<String> {
	located
		.iter()
		.map(|entry| {
			let entry = entry.expect("iteration succeeds");
			entry
				.qualifier()
				.map_or_else(|| "-".to_string(), |q| q.value().to_string())
		})
		.collect()
}

/// String value each entry provides.
pub(crate) fn labels(located: &Located) -> Vec<String> {
	located
		.iter()
		.map(|entry| label(&entry.expect("iteration succeeds")))
		.collect()
}

pub(crate) fn label(entry: &Entry) -> String {
	entry
		.value_as::<String>()
		.expect("provider succeeds")
		.map(|s| (*s).clone())
		.unwrap_or_default()
}

/// Wraps a source and counts its subscriptions.
#[derive(Debug)]
pub(crate) struct CountingSource {
	inner: Arc<dyn Source>,
	subscribes: AtomicUsize,
}

impl CountingSource {
	pub(crate) fn new(inner: Arc<dyn Source>) -> Arc<Self> {
		Arc::new(Self {
			inner,
			subscribes: AtomicUsize::new(0),
		})
	}

	pub(crate) fn subscribes(&self) -> usize {
		self.subscribes.load(Ordering::SeqCst)
	}
}

impl Source for CountingSource {
	fn id(&self) -> SourceId {
		self.inner.id()
	}

	fn subscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		self.subscribes.fetch_add(1, Ordering::SeqCst);
		self.inner.subscribe(ty, subscriber)
	}

	fn unsubscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: &Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		self.inner.unsubscribe(ty, subscriber)
	}

	fn contains(&self, binding: &Binding) -> bool {
		self.inner.contains(binding)
	}

	fn owns_class(&self, ty: &TypeDescriptor) -> bool {
		self.inner.owns_class(ty)
	}
}

/// Reports `bindings` one by one, then fails while `failing` is set.
#[derive(Debug)]
pub(crate) struct FailingSource {
	id: SourceId,
	bindings: Vec<(BindingRef, Rank)>,
	failing: AtomicBool,
}

impl FailingSource {
	pub(crate) fn new(bindings: Vec<(BindingRef, Rank)>) -> Arc<Self> {
		Arc::new(Self {
			id: SourceId::next(),
			bindings,
			failing: AtomicBool::new(true),
		})
	}

	pub(crate) fn heal(&self) {
		self.failing.store(false, Ordering::SeqCst);
	}
}

impl Source for FailingSource {
	fn id(&self) -> SourceId {
		self.id
	}

	fn subscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		for (binding, rank) in &self.bindings {
			subscriber.add(binding.clone(), *rank)?;
		}
		if self.failing.load(Ordering::SeqCst) {
			return Err(RegistryError::subscribe(self.id, ty, "backing store offline"));
		}
		Ok(())
	}

	fn unsubscribe(
		&self,
		_ty: &TypeDescriptor,
		subscriber: &Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		crate::source::retract_contained(self, &**subscriber)
	}

	fn contains(&self, binding: &Binding) -> bool {
		self.bindings
			.iter()
			.any(|(b, _)| std::ptr::eq(&**b, binding))
	}

	fn owns_class(&self, _ty: &TypeDescriptor) -> bool {
		false
	}
}

/// Watcher object handed to mediators.
#[derive(Debug, Default)]
pub(crate) struct Watcher {
	pub(crate) name: String,
}

/// Records every notification as `+name` / `-name`.
#[derive(Default)]
pub(crate) struct RecordingMediator {
	pub(crate) events: Mutex<Vec<String>>,
	/// Qualifier value whose `on_add` fails.
	pub(crate) reject: Mutex<Option<String>>,
}

impl RecordingMediator {
	pub(crate) fn events(&self) -> Vec<String> {
		self.events.lock().clone()
	}

	pub(crate) fn take(&self) -> Vec<String> {
		std::mem::take(&mut *self.events.lock())
	}
}

fn reported(qualifier: Option<&Qualifier>) -> String {
	qualifier.map_or_else(|| "-".to_string(), |q| q.value().to_string())
}

impl Mediator<Watcher> for RecordingMediator {
	fn on_add(
		&self,
		qualifier: Option<&Qualifier>,
		_entry: &Arc<Entry>,
		watcher: &Watcher,
	) -> Result<(), MediatorError> {
		let name = reported(qualifier);
		if self.reject.lock().as_deref() == Some(name.as_str()) {
			return Err(format!("{} rejects {name}", watcher.name).into());
		}
		self.events.lock().push(format!("+{name}"));
		Ok(())
	}

	fn on_remove(
		&self,
		qualifier: Option<&Qualifier>,
		_entry: &Arc<Entry>,
		_watcher: &Watcher,
	) -> Result<(), MediatorError> {
		self.events.lock().push(format!("-{}", reported(qualifier)));
		Ok(())
	}
}
