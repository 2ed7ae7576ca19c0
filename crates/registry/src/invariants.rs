use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crate::binding::{Provider, ProvisionError, Value};
use crate::key::{QualifiedKey, Query, TypeDescriptor};
use crate::registry::Registry;
use crate::source::{ContextSource, ProviderContext, Source};
use crate::test_fixtures::{
	CountingSource, bean, child1, child3, default_bean, labels, named_bean, names, parent, text,
};

/// Must yield sources by descending rank and each source's registrations in
/// its ranking order.
///
/// * Enforced in: `RankedAggregation::pull`, `DefaultRanking::rank`
/// * Failure symptom: a lower-ranked source's component shadows a higher one.
#[cfg_attr(test, test)]
pub(crate) fn test_rank_order_across_sources() {
	let registry = Registry::new();
	registry.add_context(&parent(), 0).expect("add");
	registry.add_context(&child3(), 3).expect("add");
	registry.add_context(&child1(), 1).expect("add");

	let roles = registry.locate(Query::any(bean()));
	assert_eq!(
		labels(&roles),
		["default-3", "default-1", "M3", "N3", "M1", "N1", "A", "-", "Z"]
	);
}

/// Must keep sources of equal rank in the order they were added.
///
/// * Enforced in: `RankedList::insert`, `RankedAggregation::pull` (pull on `>=`)
/// * Failure symptom: iteration order flips between runs or after re-adding.
#[cfg_attr(test, test)]
pub(crate) fn test_equal_rank_sources_keep_add_order() {
	let first = ProviderContext::builder()
		.add(default_bean("first"))
		.add(named_bean("first-named"))
		.build();
	let second = ProviderContext::builder()
		.add(default_bean("second"))
		.add(named_bean("second-named"))
		.build();
	let registry = Registry::new();
	let roles = registry.locate(Query::any(bean()));
	registry.add_context(&first, 2).expect("add");
	registry.add_context(&second, 2).expect("add");

	assert_eq!(
		labels(&roles),
		["first", "second", "first-named", "second-named"]
	);
}

/// Must reflect sources attached after a sequence was obtained.
///
/// * Enforced in: `Registry::add_source` (queues on live aggregations)
/// * Failure symptom: long-lived consumers never see plugins loaded later.
#[cfg_attr(test, test)]
pub(crate) fn test_live_view_sees_later_sources() {
	let registry = Registry::new();
	let roles = registry.locate(Query::named(bean()));
	assert!(names(&roles).is_empty());

	registry.add_context(&parent(), 0).expect("add");
	assert_eq!(names(&roles), ["A", "-", "Z"]);
}

/// Must not subscribe a source that no iteration step needs.
///
/// * Enforced in: `RankedAggregation::pull`
/// * Failure symptom: every query pays for every source up front.
#[cfg_attr(test, test)]
pub(crate) fn test_unneeded_source_never_subscribed() {
	let high = ProviderContext::builder().add(default_bean("high")).build();
	let low_context = ProviderContext::builder().add(default_bean("low")).build();
	let low = CountingSource::new(Arc::new(ContextSource::ranked(low_context, 0)));

	let registry = Registry::new();
	registry.add_context(&high, 5).expect("add");
	registry.add_source(low.clone(), 0).expect("add");

	let roles = registry.locate(Query::unqualified(bean()));
	let first = roles.first().expect("non-empty").expect("iteration succeeds");
	assert_eq!(first.rank(), 5);
	assert_eq!(low.subscribes(), 0);

	assert_eq!(labels(&roles), ["high", "low"]);
	assert_eq!(low.subscribes(), 1);
}

/// Must invoke a registration's provider at most once under concurrent access.
///
/// * Enforced in: `EntryCache::insert`, `Entry::value`
/// * Failure symptom: singleton components are constructed several times.
#[cfg_attr(test, test)]
pub(crate) fn test_concurrent_value_provisions_once() {
	const THREADS: usize = 8;

	let calls = Arc::new(AtomicUsize::new(0));
	let counter = calls.clone();
	let context = ProviderContext::builder()
		.bind(
			QualifiedKey::unqualified(bean()),
			move || -> Result<Value, ProvisionError> {
				counter.fetch_add(1, Ordering::SeqCst);
				thread::sleep(Duration::from_millis(10));
				Ok(text("slow"))
			},
		)
		.build();
	let registry = Arc::new(Registry::new());
	registry.add_context(&context, 0).expect("add");
	let roles = registry.locate(Query::any(bean()));

	let barrier = Arc::new(Barrier::new(THREADS));
	let handles: Vec<_> = (0..THREADS)
		.map(|_| {
			let roles = roles.clone();
			let barrier = barrier.clone();
			thread::spawn(move || {
				barrier.wait();
				let entry = roles.first().expect("non-empty").expect("iteration succeeds");
				entry.value().expect("provider succeeds")
			})
		})
		.collect();
	let values: Vec<Value> = handles
		.into_iter()
		.map(|h| h.join().expect("thread panicked"))
		.collect();

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	for value in &values[1..] {
		assert!(Arc::ptr_eq(&values[0], value));
	}
}

/// Must remove exactly the detached source's registrations.
///
/// * Enforced in: `Registry::remove_source`, `RankedAggregation::remove_source`
/// * Failure symptom: detaching one plugin hides components of another.
#[cfg_attr(test, test)]
pub(crate) fn test_removal_affects_only_removed_source() {
	let (parent, child) = (parent(), child1());
	let registry = Registry::new();
	registry.add_context(&parent, 0).expect("add");
	registry.add_context(&child, 1).expect("add");
	let roles = registry.locate(Query::named(bean()));
	let before = roles.entries().expect("entries");

	registry.remove_context(&child).expect("remove");
	let after = roles.entries().expect("entries");
	assert_eq!(names(&roles), ["A", "-", "Z"]);
	for entry in &after {
		assert!(before.iter().any(|b| Arc::ptr_eq(b, entry)), "survivors keep their entries");
	}
}

/// Must not subscribe a source that is detached before any iteration reached it.
///
/// * Enforced in: `RankedAggregation::remove_source`
/// * Failure symptom: detaching a source triggers work for it.
#[cfg_attr(test, test)]
pub(crate) fn test_removing_pending_source_costs_nothing() {
	let context = ProviderContext::builder().add(named_bean("P")).build();
	let counted = CountingSource::new(Arc::new(ContextSource::ranked(context, 0)));
	let registry = Registry::new();
	let roles = registry.locate(Query::named(bean()));

	registry.add_source(counted.clone(), 0).expect("add");
	registry.remove_source(counted.id()).expect("remove");
	assert!(names(&roles).is_empty());
	assert_eq!(counted.subscribes(), 0);
}

/// Must rank just-in-time registrations after every explicit one and create
/// each at most once per source.
///
/// * Enforced in: `ContextSource::subscribe`, `ProviderContext::implicit_binding`
/// * Failure symptom: an implicit default shadows a configured component, or
///   its provider is rebuilt on every query.
#[cfg_attr(test, test)]
pub(crate) fn test_implicit_binding_sorts_last_and_is_created_once() {
	let widget = TypeDescriptor::concrete("Widget");
	let attempts = Arc::new(AtomicUsize::new(0));
	let counter = attempts.clone();
	let jit = ProviderContext::builder()
		.just_in_time(move |ty: &TypeDescriptor| {
			counter.fetch_add(1, Ordering::SeqCst);
			let name = ty.name().to_string();
			let provider: Arc<dyn Provider> =
				Arc::new(move || -> Result<Value, ProvisionError> { Ok(text(&name)) });
			Ok(Some(provider))
		})
		.build();
	let explicit = ProviderContext::builder()
		.bind_instance(QualifiedKey::named(widget.clone(), "low"), text("low"))
		.build();

	let registry = Registry::new();
	registry.add_context(&jit, 100).expect("add");
	registry.add_context(&explicit, -100).expect("add");

	let first = registry.locate(Query::any(widget.clone()));
	assert_eq!(labels(&first), ["low", "Widget"]);
	drop(first);

	let second = registry.locate(Query::any(widget));
	assert_eq!(labels(&second), ["low", "Widget"]);
	assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
