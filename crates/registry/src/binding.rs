//! Registrations and the providers behind them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::key::{QualifiedKey, Qualifier, TypeDescriptor};

/// Type-erased component value produced by a [`Provider`].
pub type Value = Arc<dyn Any + Send + Sync>;

/// A provider failed to produce its value.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProvisionError {
	message: String,
	#[source]
	cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProvisionError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			cause: None,
		}
	}

	pub fn with_cause(
		message: impl Into<String>,
		cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
	) -> Self {
		Self {
			message: message.into(),
			cause: Some(cause.into()),
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Produces the value of a registration on demand.
pub trait Provider: Send + Sync {
	fn get(&self) -> Result<Value, ProvisionError>;
}

impl<F> Provider for F
where
	F: Fn() -> Result<Value, ProvisionError> + Send + Sync,
{
	fn get(&self) -> Result<Value, ProvisionError> {
		self()
	}
}

/// Provider that hands out clones of one pre-built value.
struct InstanceProvider(Value);

impl Provider for InstanceProvider {
	fn get(&self) -> Result<Value, ProvisionError> {
		Ok(self.0.clone())
	}
}

/// Shared handle to a registration; compared by identity.
pub type BindingRef = Arc<Binding>;

/// One `(key, provider)` contribution of a source.
///
/// Bindings are immutable and compared by identity ([`BindingId`]), never
/// structurally: two bindings with equal keys are still distinct.
pub struct Binding {
	key: QualifiedKey,
	provider: Arc<dyn Provider>,
	hidden: bool,
	implicit: bool,
}

impl Binding {
	/// Creates a published binding.
	pub fn new(key: QualifiedKey, provider: impl Provider + 'static) -> BindingRef {
		Self::from_provider(key, Arc::new(provider))
	}

	/// Creates a published binding from a shared provider.
	pub fn from_provider(key: QualifiedKey, provider: Arc<dyn Provider>) -> BindingRef {
		Arc::new(Self {
			key,
			provider,
			hidden: false,
			implicit: false,
		})
	}

	/// Creates a binding whose provider always returns `value`.
	pub fn instance(key: QualifiedKey, value: Value) -> BindingRef {
		Self::new(key, InstanceProvider(value))
	}

	/// Creates a binding that its owner keeps private: sources never publish it.
	pub fn hidden(key: QualifiedKey, provider: impl Provider + 'static) -> BindingRef {
		Arc::new(Self {
			key,
			provider: Arc::new(provider),
			hidden: true,
			implicit: false,
		})
	}

	/// Creates the just-in-time binding for a concrete type.
	pub(crate) fn implicit(ty: TypeDescriptor, provider: Arc<dyn Provider>) -> BindingRef {
		Arc::new(Self {
			key: QualifiedKey::unqualified(ty),
			provider,
			hidden: false,
			implicit: true,
		})
	}

	pub fn key(&self) -> &QualifiedKey {
		&self.key
	}

	pub fn ty(&self) -> &TypeDescriptor {
		self.key.ty()
	}

	pub fn qualifier(&self) -> Option<&Qualifier> {
		self.key.qualifier()
	}

	pub fn is_hidden(&self) -> bool {
		self.hidden
	}

	/// True for just-in-time bindings created by a source's fallback.
	pub fn is_implicit(&self) -> bool {
		self.implicit
	}

	/// Invokes the provider. Not memoized; see [`crate::Entry::value`].
	pub fn provide(&self) -> Result<Value, ProvisionError> {
		self.provider.get()
	}
}

impl fmt::Debug for Binding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Binding")
			.field("key", &self.key)
			.field("id", &BindingId::from_ptr(self))
			.field("hidden", &self.hidden)
			.field("implicit", &self.implicit)
			.finish()
	}
}

/// Identity of a binding allocation.
///
/// Only meaningful while the binding is alive; holders of a `BindingId` keep
/// the matching [`BindingRef`] next to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

impl BindingId {
	pub fn of(binding: &BindingRef) -> Self {
		Self::from_ptr(binding)
	}

	fn from_ptr(binding: &Binding) -> Self {
		Self(std::ptr::from_ref(binding) as usize)
	}
}

impl fmt::Debug for BindingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BindingId({:#x})", self.0)
	}
}
