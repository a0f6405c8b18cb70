//! # Debounce Tests
//!
//! Debounced handlers on the registry's virtual-clock timer queue.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use cherry_common::EventsConfig;
use cherry_events::{EventRegistry, Handler, Target, TimerQueue, TriggerOptions};

use crate::{CallLog, Fixture};

const PAGE: &str = r#"<html><body>
<input id="search" type="search">
<ul id="results"><li class="hit" id="h1"></li><li class="hit" id="h2"></li></ul>
</body></html>"#;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn page() -> (Fixture, CallLog) {
    (Fixture::new(PAGE).unwrap(), CallLog::new())
}

/// The delay restarts on every dispatch; one call after the last one.
#[test]
fn test_timed_from_last_event() {
    let (fx, log) = page();
    let search = fx.element("search").unwrap();
    let timers = fx.registry.timers().clone();

    fx.registry
        .on(&search, "input", log.handler("lookup"))
        .unwrap()
        .debounce(ms(200));

    for _ in 0..5 {
        fx.registry.trigger(&search, "input", TriggerOptions::new()).unwrap();
        timers.advance(ms(150));
    }
    assert!(log.calls().is_empty());
    assert_eq!(timers.pending_count(), 1);

    timers.advance(ms(50));
    assert_eq!(log.take(), vec!["lookup"]);
    assert_eq!(timers.pending_count(), 0);
}

/// The last dispatched event is the one the handler sees.
#[test]
fn test_runs_with_last_event() {
    let (fx, _) = page();
    let search = fx.element("search").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    fx.registry
        .on(
            &search,
            "input",
            Handler::new(move |ctx| {
                sink.borrow_mut().push(ctx.detail().cloned());
            }),
        )
        .unwrap()
        .debounce(ms(10));

    for query in ["r", "ru", "rus"] {
        fx.registry
            .trigger(
                &search,
                "input",
                TriggerOptions::new().detail(serde_json::json!(query)),
            )
            .unwrap();
    }
    fx.registry.timers().run_until_idle();

    assert_eq!(*seen.borrow(), vec![Some(serde_json::json!("rus"))]);
}

/// Undebounced handlers on the same node still run synchronously.
#[test]
fn test_mixed_with_immediate_handlers() {
    let (fx, log) = page();
    let search = fx.element("search").unwrap();

    fx.registry.on(&search, "input", log.handler("now")).unwrap();
    fx.registry
        .on(&search, "input", log.handler("later"))
        .unwrap()
        .debounce(ms(30));

    fx.registry.trigger(&search, "input", TriggerOptions::new()).unwrap();
    fx.registry.trigger(&search, "input", TriggerOptions::new()).unwrap();
    assert_eq!(log.take(), vec!["now", "now"]);

    fx.registry.timers().advance(ms(30));
    assert_eq!(log.take(), vec!["later"]);
}

/// Each debounced record has its own timer.
#[test]
fn test_independent_timers_per_record() {
    let (fx, log) = page();
    let search = fx.element("search").unwrap();
    let timers = fx.registry.timers().clone();

    fx.registry
        .on(&search, "a.input", log.handler("fast"))
        .unwrap()
        .debounce(ms(10));
    fx.registry
        .on(&search, "b.input", log.handler("slow"))
        .unwrap()
        .debounce(ms(100));

    fx.registry.trigger(&search, "input", TriggerOptions::new()).unwrap();
    assert_eq!(timers.pending_count(), 2);

    timers.advance(ms(10));
    assert_eq!(log.take(), vec!["fast"]);
    timers.advance(ms(90));
    assert_eq!(log.take(), vec!["slow"]);
}

/// A namespaced trigger only restarts the timer of the records it selects.
#[test]
fn test_namespaced_trigger_restarts_only_its_timer() {
    let (fx, log) = page();
    let search = fx.element("search").unwrap();
    let timers = fx.registry.timers().clone();

    fx.registry
        .on(&search, "a.input", log.handler("a"))
        .unwrap()
        .debounce(ms(50));
    fx.registry
        .on(&search, "b.input", log.handler("b"))
        .unwrap()
        .debounce(ms(50));

    fx.registry.trigger(&search, "input", TriggerOptions::new()).unwrap();
    timers.advance(ms(40));
    fx.registry.trigger(&search, "a.input", TriggerOptions::new()).unwrap();
    timers.advance(ms(10));
    assert_eq!(log.take(), vec!["b"]);

    timers.advance(ms(40));
    assert_eq!(log.take(), vec!["a"]);
}

/// Delegated debounced handlers keep the matched element of the last event.
#[test]
fn test_delegated_debounce() {
    let (fx, _) = page();
    let results = fx.element("results").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    fx.registry
        .delegate(
            &results,
            ".hit",
            "mouseover",
            Handler::new(move |ctx| {
                let id = ctx.this().node().and_then(|n| n.get_attribute("id"));
                sink.borrow_mut().push(id.unwrap_or_default());
            }),
        )
        .unwrap()
        .debounce(ms(25));

    fx.registry.trigger("#h1", "mouseover", TriggerOptions::new()).unwrap();
    fx.registry.trigger("#h2", "mouseover", TriggerOptions::new()).unwrap();
    fx.registry.timers().advance(ms(25));

    assert_eq!(*seen.borrow(), vec!["h2"]);
}

#[test]
fn test_off_cancels_pending_call() {
    let (fx, log) = page();
    let search = fx.element("search").unwrap();
    let timers = fx.registry.timers().clone();

    fx.registry
        .on(&search, "input", log.handler("lookup"))
        .unwrap()
        .debounce(ms(20));
    fx.registry.trigger(&search, "input", TriggerOptions::new()).unwrap();
    assert_eq!(timers.pending_count(), 1);

    fx.registry.off(&search, Some("input"), None).unwrap();
    assert_eq!(timers.pending_count(), 0);
    timers.advance(ms(100));
    assert!(log.calls().is_empty());
}

/// With cancellation disabled the timer still fires, but the removed handler does not run.
#[test]
fn test_removed_handler_never_runs() {
    let doc = Rc::new(cherry_dom::Document::parse_html(PAGE).unwrap());
    let timers = Rc::new(TimerQueue::new());
    let config = EventsConfig {
        cancel_debounce_on_remove: false,
        ..EventsConfig::default()
    };
    let registry = EventRegistry::with_config(doc.clone(), timers.clone(), config);
    let log = CallLog::new();

    registry
        .on(Target::Window, "scroll", log.handler("sync"))
        .unwrap()
        .debounce(ms(5));
    registry.trigger(Target::Window, "scroll", TriggerOptions::new()).unwrap();
    registry.off(Target::Window, None, None).unwrap();

    assert_eq!(timers.pending_count(), 1);
    assert_eq!(timers.advance(ms(5)), 1);
    assert!(log.calls().is_empty());
}

/// A once record fires after its debounce and is then removed.
#[test]
fn test_debounced_once() {
    let (fx, log) = page();
    let search = fx.element("search").unwrap();

    fx.registry
        .once(&search, "change", log.handler("once"))
        .unwrap()
        .debounce(ms(10));

    fx.registry.trigger(&search, "change", TriggerOptions::new()).unwrap();
    fx.registry.trigger(&search, "change", TriggerOptions::new()).unwrap();
    assert_eq!(fx.registry.handler_count(), 1);

    fx.registry.timers().advance(ms(10));
    assert_eq!(log.take(), vec!["once"]);
    assert_eq!(fx.registry.manager_count(), 0);

    fx.registry.trigger(&search, "change", TriggerOptions::new()).unwrap();
    fx.registry.timers().run_until_idle();
    assert!(log.calls().is_empty());
}

/// Registries can share one timer queue.
#[test]
fn test_shared_timer_queue() {
    let first = Rc::new(cherry_dom::Document::parse_html(PAGE).unwrap());
    let second = Rc::new(cherry_dom::Document::parse_html(PAGE).unwrap());
    let timers = Rc::new(TimerQueue::new());
    let a = EventRegistry::with_config(first, timers.clone(), EventsConfig::default());
    let b = EventRegistry::with_config(second, timers.clone(), EventsConfig::default());
    let log = CallLog::new();

    a.on("#search", "input", log.handler("a")).unwrap().debounce(ms(10));
    b.on("#search", "input", log.handler("b")).unwrap().debounce(ms(20));
    a.trigger("#search", "input", TriggerOptions::new()).unwrap();
    b.trigger("#search", "input", TriggerOptions::new()).unwrap();

    assert_eq!(timers.run_until_idle(), 2);
    assert_eq!(log.take(), vec!["a", "b"]);
}
