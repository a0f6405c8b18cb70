//! # Delegation Tests
//!
//! Delegated handlers against live trees: matching, `this`, removal
//! variants and window delegation.

use std::cell::RefCell;
use std::rc::Rc;

use cherry_events::{EventError, Handler, Target, TriggerOptions};

use crate::{CallLog, Fixture};

const LIST: &str = r#"<html><body>
<ul id="list" class="tree">
  <li class="row" id="r1"><a href="/one" id="link1"><em id="em1">One</em></a></li>
  <li class="row selected" id="r2"><a href="/two" id="link2">Two</a></li>
  <li class="divider" id="div"></li>
</ul>
<p class="row" id="stray">Stray</p>
</body></html>"#;

fn list() -> (Fixture, CallLog) {
    (Fixture::new(LIST).unwrap(), CallLog::new())
}

/// Records the id of the matched element for every call.
fn matched(log: &CallLog) -> Handler {
    let log = log.clone();
    Handler::new(move |ctx| {
        let id = ctx
            .delegate_target()
            .and_then(|n| n.get_attribute("id"))
            .unwrap_or_default();
        log.push(id);
    })
}

#[test]
fn test_click_on_descendant_of_match() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry.delegate(&root, ".row", "click", matched(&log)).unwrap();

    fx.element("em1").unwrap().click();
    fx.element("link2").unwrap().click();
    fx.element("div").unwrap().click();
    fx.element("stray").unwrap().click();

    assert_eq!(log.take(), vec!["r1", "r2"]);
}

/// The innermost match wins only if it comes first in document order.
#[test]
fn test_nested_matches_use_document_order() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry.delegate(&root, "li, a", "click", matched(&log)).unwrap();
    fx.element("em1").unwrap().click();

    assert_eq!(log.take(), vec!["r1"]);
}

#[test]
fn test_this_is_matched_element() {
    let (fx, _) = list();
    let root = fx.element("list").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    fx.registry
        .delegate(
            &root,
            "a[href]",
            "click",
            Handler::new(move |ctx| {
                let this = ctx.this().node().and_then(|n| n.get_attribute("href"));
                sink.borrow_mut().push(this.unwrap_or_default());
            }),
        )
        .unwrap();

    fx.element("em1").unwrap().click();
    fx.element("r2").unwrap().click();
    assert_eq!(*seen.borrow(), vec!["/one"]);
}

/// Elements added after registration are matched at dispatch time.
#[test]
fn test_matches_elements_added_later() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry.delegate(&root, ".row", "click", matched(&log)).unwrap();

    let row = fx.document.create_element("li");
    row.set_attribute("class", "row").unwrap();
    row.set_attribute("id", "r3").unwrap();
    root.append_child(row.clone());
    row.click();

    let detached = fx.element("em1").unwrap();
    let removed = fx.element("r1").unwrap();
    root.remove_child(&removed).unwrap();
    detached.click();

    assert_eq!(log.take(), vec!["r3"]);
}

/// Class changes take effect on the next dispatch.
#[test]
fn test_attribute_changes_are_live() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();
    let divider = fx.element("div").unwrap();

    fx.registry
        .delegate(&root, ".selected", "click", matched(&log))
        .unwrap();

    divider.click();
    divider.set_attribute("class", "divider selected").unwrap();
    divider.click();

    assert_eq!(log.take(), vec!["div"]);
}

#[test]
fn test_delegated_and_direct_share_order() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry.on(&root, "click", log.handler("direct-1")).unwrap();
    fx.registry
        .delegate(&root, ".row", "click", log.handler("delegated"))
        .unwrap();
    fx.registry.on(&root, "click", log.handler("direct-2")).unwrap();

    fx.element("link1").unwrap().click();
    assert_eq!(log.take(), vec!["direct-1", "delegated", "direct-2"]);
    assert_eq!(root.event_target.listener_count("click"), 1);
}

#[test]
fn test_undelegate_by_selector() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry.delegate(&root, ".row", "click", log.handler("rows")).unwrap();
    fx.registry.delegate(&root, "a", "click", log.handler("links")).unwrap();
    fx.registry
        .delegate(&root, ".row", "nav.click", log.handler("nav"))
        .unwrap();

    assert_eq!(
        fx.registry
            .undelegate_by_selector(&root, ".row", "click")
            .unwrap(),
        1
    );
    fx.element("link1").unwrap().click();
    assert_eq!(log.take(), vec!["links", "nav"]);

    assert_eq!(
        fx.registry
            .undelegate_by_selector(&root, ".row", "nav.click")
            .unwrap(),
        1
    );
    fx.element("link1").unwrap().click();
    assert_eq!(log.take(), vec!["links"]);
}

#[test]
fn test_undelegate_by_handler_leaves_direct_registration() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();
    let h = log.handler("h");

    fx.registry.delegate(&root, ".row", "click", h.clone()).unwrap();
    fx.registry.delegate(&root, "a", "click", h.clone()).unwrap();
    fx.registry.on(&root, "click", h.clone()).unwrap();

    assert_eq!(fx.registry.undelegate_by_handler(&root, "click", &h).unwrap(), 2);
    fx.element("link1").unwrap().click();
    assert_eq!(log.take(), vec!["h"]);
}

#[test]
fn test_undelegate_all() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry.delegate(&root, ".row", "click", log.handler("a")).unwrap();
    fx.registry.delegate(&root, "a", "ns.click", log.handler("b")).unwrap();
    fx.registry.delegate(&root, "a", "focus", log.handler("c")).unwrap();

    assert_eq!(fx.registry.undelegate_all(&root, Some("ns.click")).unwrap(), 1);
    assert_eq!(fx.registry.undelegate_all(&root, None).unwrap(), 2);
    assert_eq!(fx.registry.manager_count(), 0);
    assert_eq!(root.event_target.total_listener_count(), 0);
}

#[test]
fn test_delegate_from_window() {
    let (fx, log) = list();

    fx.registry
        .delegate(Target::Window, "p.row", "click", matched(&log))
        .unwrap();
    fx.element("stray").unwrap().click();
    fx.element("r1").unwrap().click();

    assert_eq!(log.take(), vec!["stray"]);
}

#[test]
fn test_delegate_via_selector_root() {
    let (fx, log) = list();

    fx.registry.delegate("ul.tree", "a", "click", matched(&log)).unwrap();
    fx.element("link2").unwrap().click();
    assert_eq!(log.take(), vec!["link2"]);

    assert!(matches!(
        fx.registry.delegate("ol", "a", "click", matched(&log)),
        Err(EventError::TargetNotFound(_))
    ));
}

#[test]
fn test_invalid_delegate_selector() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    assert!(matches!(
        fx.registry.delegate(&root, "li[", "click", log.handler("x")),
        Err(EventError::Dom(_))
    ));
    assert_eq!(fx.registry.manager_count(), 0);
}

/// Namespaced triggers reach delegated handlers under that name only.
#[test]
fn test_trigger_through_delegation() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    fx.registry
        .delegate(&root, ".row", "open", log.handler("plain"))
        .unwrap();
    fx.registry
        .delegate(&root, ".row", "tree.open", log.handler("tree"))
        .unwrap();

    fx.registry
        .trigger("#link1", "tree.open", TriggerOptions::new())
        .unwrap();
    assert_eq!(log.take(), vec!["tree"]);

    fx.registry.trigger("#link1", "open", TriggerOptions::new()).unwrap();
    assert_eq!(log.take(), vec!["plain", "tree"]);
}

#[test]
fn test_delegate_record() {
    let (fx, log) = list();
    let root = fx.element("list").unwrap();

    let record = fx
        .registry
        .delegate(&root, ".row", "nav.click", log.handler("row"))
        .unwrap();
    assert!(!record.is_once());
    assert_eq!(record.selector(), Some(".row"));
    assert_eq!(record.name().namespace(), Some("nav"));

    fx.element("div").unwrap().click();
    fx.element("r2").unwrap().click();
    assert_eq!(log.take(), vec!["row"]);

    fx.registry.off(&root, None, None).unwrap();
    assert!(!record.is_active());
}
