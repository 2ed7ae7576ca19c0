//! Type descriptors, qualifiers, and query keys.

use std::fmt;
use std::sync::Arc;

use crate::binding::Binding;

/// Structural identity of a component type.
///
/// Two descriptors are equal when their names, type arguments and abstract
/// flags are equal. Abstract descriptors (interfaces, traits) are never
/// instantiated implicitly.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
	name: Arc<str>,
	args: Arc<[TypeDescriptor]>,
	is_abstract: bool,
}

impl TypeDescriptor {
	/// Creates a concrete (instantiable) type descriptor.
	pub fn concrete(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			args: Arc::from([]),
			is_abstract: false,
		}
	}

	/// Creates an abstract type descriptor.
	pub fn abstract_type(name: impl Into<Arc<str>>) -> Self {
		Self {
			is_abstract: true,
			..Self::concrete(name)
		}
	}

	/// Creates a concrete descriptor named after a Rust type.
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self::concrete(std::any::type_name::<T>())
	}

	/// Returns this descriptor parameterized with `args`.
	pub fn with_args(self, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
		Self {
			args: args.into_iter().collect(),
			..self
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn args(&self) -> &[TypeDescriptor] {
		&self.args
	}

	pub fn is_abstract(&self) -> bool {
		self.is_abstract
	}

	pub fn is_concrete(&self) -> bool {
		!self.is_abstract
	}

	/// Returns true if this descriptor carries type arguments.
	pub fn is_parameterized(&self) -> bool {
		!self.args.is_empty()
	}

	/// Returns the descriptor with its type arguments erased.
	pub fn raw(&self) -> Self {
		Self {
			name: self.name.clone(),
			args: Arc::from([]),
			is_abstract: self.is_abstract,
		}
	}
}

impl fmt::Display for TypeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)?;
		if let Some((first, rest)) = self.args.split_first() {
			write!(f, "<{first}")?;
			for arg in rest {
				write!(f, ", {arg}")?;
			}
			f.write_str(">")?;
		}
		Ok(())
	}
}

impl fmt::Debug for TypeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_abstract {
			write!(f, "TypeDescriptor(abstract {self})")
		} else {
			write!(f, "TypeDescriptor({self})")
		}
	}
}

/// Secondary discriminator between registrations of the same type.
///
/// A qualifier has a kind (for example [`Qualifier::NAMED`]) and a value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier {
	kind: Arc<str>,
	value: Arc<str>,
}

impl Qualifier {
	/// Kind used by [`Qualifier::named`].
	pub const NAMED: &'static str = "named";
	/// Value reported for unqualified registrations matched by kind.
	pub const DEFAULT_VALUE: &'static str = "default";

	pub fn new(kind: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
		Self {
			kind: kind.into(),
			value: value.into(),
		}
	}

	/// Shorthand for a qualifier of kind [`Qualifier::NAMED`].
	pub fn named(value: impl Into<Arc<str>>) -> Self {
		Self::new(Self::NAMED, value)
	}

	/// The qualifier an unqualified registration is reported under for `kind`.
	pub fn default_for(kind: impl Into<Arc<str>>) -> Self {
		Self::new(kind, Self::DEFAULT_VALUE)
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn is_default(&self) -> bool {
		&*self.value == Self::DEFAULT_VALUE
	}
}

impl fmt::Display for Qualifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "@{}({:?})", self.kind, self.value)
	}
}

impl fmt::Debug for Qualifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

/// Key a registration is bound under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedKey {
	ty: TypeDescriptor,
	qualifier: Option<Qualifier>,
}

impl QualifiedKey {
	pub fn new(ty: TypeDescriptor, qualifier: Option<Qualifier>) -> Self {
		Self { ty, qualifier }
	}

	pub fn unqualified(ty: TypeDescriptor) -> Self {
		Self::new(ty, None)
	}

	pub fn qualified(ty: TypeDescriptor, qualifier: Qualifier) -> Self {
		Self::new(ty, Some(qualifier))
	}

	/// Shorthand for a key qualified with [`Qualifier::named`].
	pub fn named(ty: TypeDescriptor, name: impl Into<Arc<str>>) -> Self {
		Self::qualified(ty, Qualifier::named(name))
	}

	pub fn ty(&self) -> &TypeDescriptor {
		&self.ty
	}

	pub fn qualifier(&self) -> Option<&Qualifier> {
		self.qualifier.as_ref()
	}
}

impl fmt::Display for QualifiedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.qualifier {
			Some(qualifier) => write!(f, "{qualifier} {}", self.ty),
			None => write!(f, "{}", self.ty),
		}
	}
}

/// Qualifier constraint of a [`Query`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QualifierFilter {
	/// Every registration, qualifiers reported as bound.
	Any,
	/// Only registrations without a qualifier.
	Unqualified,
	/// Registrations qualified with this kind; unqualified ones are reported
	/// as [`Qualifier::default_for`] the kind.
	Kind(Arc<str>),
	/// Registrations qualified with exactly this qualifier. A default-valued
	/// qualifier also matches unqualified registrations.
	Exact(Qualifier),
}

impl QualifierFilter {
	/// Returns true if `binding` is visible through this filter.
	///
	/// Implicit registrations stand in for "the type itself" and are only
	/// visible to unrestricted or unqualified queries.
	pub fn matches(&self, binding: &Binding) -> bool {
		let qualifier = binding.qualifier();
		match self {
			Self::Any => true,
			Self::Unqualified => qualifier.is_none(),
			Self::Kind(kind) => {
				!binding.is_implicit() && qualifier.is_none_or(|q| q.kind() == &**kind)
			}
			Self::Exact(expected) => match qualifier {
				Some(q) => q == expected,
				None => !binding.is_implicit() && expected.is_default(),
			},
		}
	}

	/// Returns the qualifier `binding` is reported under for this filter.
	pub fn report(&self, binding: &Binding) -> Option<Qualifier> {
		match (self, binding.qualifier()) {
			(_, Some(q)) => Some(q.clone()),
			(Self::Kind(kind), None) => Some(Qualifier::default_for(kind.clone())),
			(Self::Exact(expected), None) => Some(expected.clone()),
			(Self::Any | Self::Unqualified, None) => None,
		}
	}
}

/// What a consumer asks the registry for: a type plus a qualifier constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
	ty: TypeDescriptor,
	filter: QualifierFilter,
}

impl Query {
	pub fn new(ty: TypeDescriptor, filter: QualifierFilter) -> Self {
		Self { ty, filter }
	}

	/// All registrations of `ty`.
	pub fn any(ty: TypeDescriptor) -> Self {
		Self::new(ty, QualifierFilter::Any)
	}

	/// Unqualified registrations of `ty`.
	pub fn unqualified(ty: TypeDescriptor) -> Self {
		Self::new(ty, QualifierFilter::Unqualified)
	}

	/// Registrations of `ty` qualified with `kind`.
	pub fn kind(ty: TypeDescriptor, kind: impl Into<Arc<str>>) -> Self {
		Self::new(ty, QualifierFilter::Kind(kind.into()))
	}

	/// Registrations of `ty` qualified with any [`Qualifier::named`] value.
	pub fn named(ty: TypeDescriptor) -> Self {
		Self::kind(ty, Qualifier::NAMED)
	}

	/// Registrations of `ty` qualified with exactly `qualifier`.
	pub fn exact(ty: TypeDescriptor, qualifier: Qualifier) -> Self {
		Self::new(ty, QualifierFilter::Exact(qualifier))
	}

	pub fn ty(&self) -> &TypeDescriptor {
		&self.ty
	}

	pub fn filter(&self) -> &QualifierFilter {
		&self.filter
	}
}

impl fmt::Display for Query {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.filter {
			QualifierFilter::Any => write!(f, "{}", self.ty),
			QualifierFilter::Unqualified => write!(f, "{} (unqualified)", self.ty),
			QualifierFilter::Kind(kind) => write!(f, "@{kind} {}", self.ty),
			QualifierFilter::Exact(qualifier) => write!(f, "{qualifier} {}", self.ty),
		}
	}
}
