//! Registry configuration.

use serde::{Deserialize, Serialize};

use crate::source::ContextRank;

/// Settings applied to the sources a [`crate::Registry`] builds for provider
/// contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
	/// Whether contexts contribute just-in-time registrations for concrete
	/// types they have no explicit registration for.
	#[serde(default = "default_true")]
	pub implicit_bindings: bool,
	/// Whether a query for a parameterized type also sees registrations of
	/// its raw type.
	#[serde(default)]
	pub raw_type_fallback: bool,
	/// Rank used by [`crate::Registry::add_context_default`].
	#[serde(default)]
	pub default_rank: ContextRank,
}

fn default_true() -> bool {
	true
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			implicit_bindings: true,
			raw_type_fallback: false,
			default_rank: 0,
		}
	}
}
