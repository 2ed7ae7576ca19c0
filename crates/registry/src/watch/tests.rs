use std::sync::Arc;

use super::WatchedBindings;
use crate::error::RegistryError;
use crate::key::{Qualifier, Query};
use crate::source::Subscriber;
use crate::test_fixtures::{RecordingMediator, Watcher, bean, default_bean, named_bean};

fn watched(
	query: Query,
	watcher: &Arc<Watcher>,
) -> (Arc<RecordingMediator>, WatchedBindings<Watcher>) {
	let mediator = Arc::new(RecordingMediator::default());
	let bindings = WatchedBindings::new(query, mediator.clone(), watcher);
	(mediator, bindings)
}

#[test]
fn test_announces_each_match_once() {
	let watcher = Arc::new(Watcher::default());
	let (mediator, watched) = watched(Query::named(bean()), &watcher);
	let a = named_bean("A");
	let default = default_bean("d");

	watched.add(a.clone(), 0).expect("add");
	watched.add(a.clone(), 0).expect("repeat add");
	watched.add(default.clone(), 0).expect("add");

	assert_eq!(mediator.events(), vec!["+A", "+default"]);
	assert_eq!(watched.bindings().len(), 2);
}

#[test]
fn test_filter_skips_non_matching_bindings() {
	let watcher = Arc::new(Watcher::default());
	let (mediator, watched) = watched(Query::exact(bean(), Qualifier::named("B")), &watcher);

	watched.add(named_bean("A"), 0).expect("add");
	watched.add(default_bean("d"), 0).expect("add");
	watched.add(named_bean("B"), 0).expect("add");

	assert_eq!(mediator.events(), vec!["+B"]);
}

#[test]
fn test_remove_announces_only_known_entries() {
	let watcher = Arc::new(Watcher::default());
	let (mediator, watched) = watched(Query::any(bean()), &watcher);
	let a = named_bean("A");

	watched.remove(&a).expect("unknown remove");
	assert!(mediator.events().is_empty());

	watched.add(a.clone(), 0).expect("add");
	watched.remove(&a).expect("remove");
	watched.remove(&a).expect("repeat remove");
	assert_eq!(mediator.events(), vec!["+A", "-A"]);
	assert!(watched.bindings().is_empty());
}

#[test]
fn test_dropped_watcher_is_not_notified() {
	let watcher = Arc::new(Watcher::default());
	let (mediator, watched) = watched(Query::any(bean()), &watcher);
	drop(watcher);

	watched.add(named_bean("A"), 0).expect("add");
	assert!(mediator.events().is_empty());
}

#[test]
fn test_mediator_failure_surfaces() {
	let watcher = Arc::new(Watcher {
		name: "picky".to_string(),
	});
	let (mediator, watched) = watched(Query::any(bean()), &watcher);
	*mediator.reject.lock() = Some("bad".to_string());

	let err = watched.add(named_bean("bad"), 0).expect_err("rejected");
	assert!(matches!(err, RegistryError::Mediator(_)));
	assert!(err.to_string().contains("picky rejects bad"));
	watched.add(named_bean("good"), 0).expect("add");
	assert_eq!(mediator.events(), vec!["+good"]);
}
