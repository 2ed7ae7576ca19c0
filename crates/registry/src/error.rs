//! Error types for registry operations.

use crate::binding::ProvisionError;
use crate::key::TypeDescriptor;
use crate::source::SourceId;

/// Boxed error returned by a watcher's mediator.
pub type MediatorError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the registry, its sources and its sequences.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	/// A source failed to report its registrations for a type.
	#[error("{source_id} failed to subscribe for {ty}: {message}")]
	Subscribe {
		source_id: SourceId,
		ty: TypeDescriptor,
		message: String,
	},
	/// A watcher's mediator rejected a notification.
	#[error("mediator failed: {0}")]
	Mediator(#[source] MediatorError),
	/// A provider failed to produce a value.
	#[error(transparent)]
	Provision(#[from] ProvisionError),
	/// The operation is not supported by the receiver.
	#[error("unsupported operation: {0}")]
	Unsupported(&'static str),
}

impl RegistryError {
	pub fn subscribe(source_id: SourceId, ty: &TypeDescriptor, message: impl Into<String>) -> Self {
		Self::Subscribe {
			source_id,
			ty: ty.clone(),
			message: message.into(),
		}
	}
}
