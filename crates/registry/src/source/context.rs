//! Static provider contexts and the source that publishes them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{
	ContextRank, DefaultRanking, IMPLICIT_RANK, RankingFunction, Source, SourceId, Subscriber,
	retract_contained,
};
use crate::binding::{Binding, BindingRef, Provider, ProvisionError, Value};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::key::{QualifiedKey, TypeDescriptor};

/// Creates a provider for a concrete type that has no explicit registration.
///
/// `Ok(None)` means the type cannot be instantiated just in time.
pub type JitFactory =
	dyn Fn(&TypeDescriptor) -> Result<Option<Arc<dyn Provider>>, ProvisionError> + Send + Sync;

/// Immutable set of registrations with an optional just-in-time factory.
pub struct ProviderContext {
	id: SourceId,
	bindings: Vec<BindingRef>,
	by_type: FxHashMap<TypeDescriptor, Vec<BindingRef>>,
	just_in_time: Option<Box<JitFactory>>,
	/// Outcome of each just-in-time attempt, keyed by type.
	implicit: Mutex<FxHashMap<TypeDescriptor, Option<BindingRef>>>,
}

impl ProviderContext {
	pub fn builder() -> ContextBuilder {
		ContextBuilder::default()
	}

	pub fn id(&self) -> SourceId {
		self.id
	}

	/// Every explicit registration in bind order, hidden ones included.
	pub fn bindings(&self) -> &[BindingRef] {
		&self.bindings
	}

	/// Explicit registrations bound to exactly `ty`, in bind order.
	pub fn bindings_for(&self, ty: &TypeDescriptor) -> &[BindingRef] {
		self.by_type.get(ty).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn has_just_in_time(&self) -> bool {
		self.just_in_time.is_some()
	}

	/// Returns true if this context instantiates `ty` just in time.
	pub fn owns_class(&self, ty: &TypeDescriptor) -> bool {
		self.just_in_time.is_some() && ty.is_concrete()
	}

	/// Identity check against explicit and already created implicit registrations.
	pub fn contains(&self, binding: &Binding) -> bool {
		let same = |candidate: &BindingRef| std::ptr::eq(&**candidate, binding);
		if self.bindings_for(binding.ty()).iter().any(same) {
			return true;
		}
		binding.is_implicit()
			&& self
				.implicit
				.lock()
				.get(binding.ty())
				.is_some_and(|slot| slot.as_ref().is_some_and(same))
	}

	/// Returns the just-in-time registration for `ty`, creating it on first use.
	///
	/// Factory failures are logged and remembered as "no registration".
	pub fn implicit_binding(&self, ty: &TypeDescriptor) -> Option<BindingRef> {
		if !self.owns_class(ty) {
			return None;
		}
		let factory = self.just_in_time.as_deref()?;
		let mut implicit = self.implicit.lock();
		if let Some(slot) = implicit.get(ty) {
			return slot.clone();
		}
		let binding = match factory(ty) {
			Ok(provider) => provider.map(|provider| Binding::implicit(ty.clone(), provider)),
			Err(error) => {
				debug!(context = %self.id, %ty, %error, "just-in-time binding failed");
				None
			}
		};
		implicit.insert(ty.clone(), binding.clone());
		binding
	}
}

impl fmt::Debug for ProviderContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderContext")
			.field("id", &self.id)
			.field("bindings", &self.bindings.len())
			.field("just_in_time", &self.just_in_time.is_some())
			.finish()
	}
}

/// Collects registrations for a [`ProviderContext`].
#[derive(Default)]
pub struct ContextBuilder {
	bindings: Vec<BindingRef>,
	just_in_time: Option<Box<JitFactory>>,
}

impl ContextBuilder {
	/// Adds a published registration.
	pub fn bind(self, key: QualifiedKey, provider: impl Provider + 'static) -> Self {
		self.add(Binding::new(key, provider))
	}

	/// Adds a registration that always yields `value`.
	pub fn bind_instance(self, key: QualifiedKey, value: Value) -> Self {
		self.add(Binding::instance(key, value))
	}

	/// Adds a registration the context keeps to itself.
	pub fn bind_hidden(self, key: QualifiedKey, provider: impl Provider + 'static) -> Self {
		self.add(Binding::hidden(key, provider))
	}

	/// Adds a pre-built registration.
	pub fn add(mut self, binding: BindingRef) -> Self {
		self.bindings.push(binding);
		self
	}

	/// Enables just-in-time registrations for concrete types.
	pub fn just_in_time<F>(mut self, factory: F) -> Self
	where
		F: Fn(&TypeDescriptor) -> Result<Option<Arc<dyn Provider>>, ProvisionError>
			+ Send
			+ Sync
			+ 'static,
	{
		self.just_in_time = Some(Box::new(factory));
		self
	}

	pub fn build(self) -> Arc<ProviderContext> {
		let mut by_type: FxHashMap<TypeDescriptor, Vec<BindingRef>> = FxHashMap::default();
		for binding in &self.bindings {
			by_type
				.entry(binding.ty().clone())
				.or_default()
				.push(binding.clone());
		}
		Arc::new(ProviderContext {
			id: SourceId::next(),
			bindings: self.bindings,
			by_type,
			just_in_time: self.just_in_time,
			implicit: Mutex::new(FxHashMap::default()),
		})
	}
}

/// Publishes one [`ProviderContext`] ranked by a [`RankingFunction`].
///
/// The context never changes, so subscribers are not retained: `subscribe`
/// reports once and `unsubscribe` only retracts.
#[derive(Clone)]
pub struct ContextSource {
	context: Arc<ProviderContext>,
	ranking: Arc<dyn RankingFunction>,
	implicit_bindings: bool,
	raw_type_fallback: bool,
}

impl ContextSource {
	pub fn new(context: Arc<ProviderContext>, ranking: Arc<dyn RankingFunction>) -> Self {
		Self::with_config(context, ranking, &RegistryConfig::default())
	}

	/// Source ranking every registration with [`DefaultRanking`] at `primary`.
	pub fn ranked(context: Arc<ProviderContext>, primary: ContextRank) -> Self {
		Self::new(context, Arc::new(DefaultRanking::new(primary)))
	}

	pub fn with_config(
		context: Arc<ProviderContext>,
		ranking: Arc<dyn RankingFunction>,
		config: &RegistryConfig,
	) -> Self {
		Self {
			context,
			ranking,
			implicit_bindings: config.implicit_bindings,
			raw_type_fallback: config.raw_type_fallback,
		}
	}

	pub fn context(&self) -> &Arc<ProviderContext> {
		&self.context
	}

	pub fn ranking(&self) -> &Arc<dyn RankingFunction> {
		&self.ranking
	}

	fn publish(
		&self,
		bindings: &[BindingRef],
		subscriber: &dyn Subscriber,
	) -> Result<(), RegistryError> {
		for binding in bindings.iter().filter(|b| !b.is_hidden()) {
			subscriber.add(binding.clone(), self.ranking.rank(binding))?;
		}
		Ok(())
	}
}

impl Source for ContextSource {
	fn id(&self) -> SourceId {
		self.context.id()
	}

	fn subscribe(
		&self,
		ty: &TypeDescriptor,
		subscriber: Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		let explicit = self.context.bindings_for(ty);
		self.publish(explicit, &*subscriber)?;

		let mut found = !explicit.is_empty();
		if self.raw_type_fallback && ty.is_parameterized() {
			let raw = self.context.bindings_for(&ty.raw());
			self.publish(raw, &*subscriber)?;
			found |= !raw.is_empty();
		}

		if !found
			&& self.owns_class(ty)
			&& let Some(binding) = self.context.implicit_binding(ty)
		{
			subscriber.add(binding, IMPLICIT_RANK)?;
		}
		Ok(())
	}

	fn unsubscribe(
		&self,
		_ty: &TypeDescriptor,
		subscriber: &Arc<dyn Subscriber>,
	) -> Result<(), RegistryError> {
		retract_contained(self, &**subscriber)
	}

	fn contains(&self, binding: &Binding) -> bool {
		self.context.contains(binding)
	}

	fn owns_class(&self, ty: &TypeDescriptor) -> bool {
		self.implicit_bindings && self.context.owns_class(ty)
	}
}

impl fmt::Debug for ContextSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ContextSource")
			.field("context", &self.context.id())
			.field("ranking", &self.ranking)
			.field("implicit_bindings", &self.implicit_bindings)
			.field("raw_type_fallback", &self.raw_type_fallback)
			.finish()
	}
}
