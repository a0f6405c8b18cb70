//! The event registry service.
//!
//! One registry per document. It owns the per-node [`EventManager`]s (at most
//! one per node, compared by identity), resolves targets, and runs the fan-out
//! for every native event a manager is subscribed to.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use cherry_common::EventsConfig;
use cherry_dom::{
    Document, DomEvent, EventDispatcher, EventId, EventListenerCallback, Node, SelectorList,
};
use tracing::{debug, trace};

use crate::delegate::find_delegate_target;
use crate::handler::{EventContext, Handler, HandlerRecord, Scope};
use crate::manager::EventManager;
use crate::name::EventName;
use crate::timers::TimerQueue;
use crate::{EventError, Result};

/// Where to register, remove or trigger.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A live node.
    Node(&'a Rc<Node>),
    /// The document's window.
    Window,
    /// The first element matching a selector at call time.
    Selector(&'a str),
}

impl<'a> From<&'a Rc<Node>> for Target<'a> {
    fn from(node: &'a Rc<Node>) -> Self {
        Target::Node(node)
    }
}

impl<'a> From<&'a str> for Target<'a> {
    fn from(selector: &'a str) -> Self {
        Target::Selector(selector)
    }
}

impl<'a> From<&'a String> for Target<'a> {
    fn from(selector: &'a String) -> Self {
        Target::Selector(selector)
    }
}

/// Options for [`EventRegistry::trigger`]. Unset flags fall back to the registry config.
#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    pub bubbles: Option<bool>,
    pub cancelable: Option<bool>,
    pub detail: Option<serde_json::Value>,
}

impl TriggerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bubbles(mut self, bubbles: bool) -> Self {
        self.bubbles = Some(bubbles);
        self
    }

    pub fn cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = Some(cancelable);
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

struct RegistryInner {
    document: Rc<Document>,
    managers: RefCell<Vec<Rc<EventManager>>>,
    timers: Rc<TimerQueue>,
    config: EventsConfig,
    /// Namespaced triggers in flight: only records selected by the name fire.
    trigger_filters: RefCell<Vec<(EventId, EventName)>>,
}

/// Handle to the registry. Clones share the same state.
#[derive(Clone)]
pub struct EventRegistry {
    inner: Rc<RegistryInner>,
}

impl EventRegistry {
    /// Create a registry with its own timer queue and the default config.
    pub fn new(document: Rc<Document>) -> Self {
        Self::with_config(document, Rc::new(TimerQueue::new()), EventsConfig::default())
    }

    pub fn with_config(
        document: Rc<Document>,
        timers: Rc<TimerQueue>,
        config: EventsConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                document,
                managers: RefCell::new(Vec::new()),
                timers,
                config,
                trigger_filters: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.inner.document
    }

    /// The timer queue debounced handlers are scheduled on.
    pub fn timers(&self) -> &Rc<TimerQueue> {
        &self.inner.timers
    }

    pub fn config(&self) -> &EventsConfig {
        &self.inner.config
    }

    /// Register a handler. Dispatch order is registration order.
    pub fn on<'a>(
        &self,
        target: impl Into<Target<'a>>,
        name: &str,
        handler: Handler,
    ) -> Result<HandlerRecord> {
        self.register(target.into(), name, handler, None, false)
    }

    /// Register a handler that removes itself after its first invocation.
    pub fn once<'a>(
        &self,
        target: impl Into<Target<'a>>,
        name: &str,
        handler: Handler,
    ) -> Result<HandlerRecord> {
        self.register(target.into(), name, handler, None, true)
    }

    /// Register a handler on `root` that fires for events whose target is, or
    /// is inside, a descendant of `root` matching `selector`.
    pub fn delegate<'a>(
        &self,
        root: impl Into<Target<'a>>,
        selector: &str,
        name: &str,
        handler: Handler,
    ) -> Result<HandlerRecord> {
        let compiled = SelectorList::parse(selector)?;
        self.register(
            root.into(),
            name,
            handler,
            Some((selector.to_string(), compiled)),
            false,
        )
    }

    /// Remove handlers from a node.
    ///
    /// - `name` and `handler`: that handler for that name.
    /// - `name` only: every handler the name selects.
    /// - neither: every handler on the node.
    ///
    /// Returns how many records were removed. Unknown targets remove nothing.
    pub fn off<'a>(
        &self,
        target: impl Into<Target<'a>>,
        name: Option<&str>,
        handler: Option<&Handler>,
    ) -> Result<usize> {
        let Some(node) = self.resolve(target.into())? else {
            return Ok(0);
        };
        let request = name.map(EventName::parse).transpose()?;

        Ok(self.remove_matching(&node, |record| {
            request.as_ref().map_or(true, |r| r.selects(record.name()))
                && handler.map_or(true, |h| record.handler().same(h))
        }))
    }

    /// Remove delegated handlers registered with `selector` for `name`.
    pub fn undelegate_by_selector<'a>(
        &self,
        root: impl Into<Target<'a>>,
        selector: &str,
        name: &str,
    ) -> Result<usize> {
        let Some(node) = self.resolve(root.into())? else {
            return Ok(0);
        };
        let request = EventName::parse(name)?;

        Ok(self.remove_matching(&node, |record| {
            record.selector() == Some(selector) && request.selects(record.name())
        }))
    }

    /// Remove a delegated handler for `name`, whatever its selector.
    pub fn undelegate_by_handler<'a>(
        &self,
        root: impl Into<Target<'a>>,
        name: &str,
        handler: &Handler,
    ) -> Result<usize> {
        let Some(node) = self.resolve(root.into())? else {
            return Ok(0);
        };
        let request = EventName::parse(name)?;

        Ok(self.remove_matching(&node, |record| {
            record.selector().is_some()
                && request.selects(record.name())
                && record.handler().same(handler)
        }))
    }

    /// Remove every delegated handler on `root`, or only those `name` selects.
    pub fn undelegate_all<'a>(&self, root: impl Into<Target<'a>>, name: Option<&str>) -> Result<usize> {
        let Some(node) = self.resolve(root.into())? else {
            return Ok(0);
        };
        let request = name.map(EventName::parse).transpose()?;

        Ok(self.remove_matching(&node, |record| {
            record.selector().is_some()
                && request.as_ref().map_or(true, |r| r.selects(record.name()))
        }))
    }

    /// Synthesize and dispatch a custom event.
    ///
    /// A namespaced name fires only the records it selects, on every manager
    /// the event reaches. Returns false if a handler prevented the default.
    pub fn trigger<'a>(
        &self,
        target: impl Into<Target<'a>>,
        name: &str,
        options: TriggerOptions,
    ) -> Result<bool> {
        let target = target.into();
        let node = self.resolve_required(target)?;
        let name = EventName::parse(name)?;

        let config = &self.inner.config;
        let event = DomEvent::custom(
            name.raw(),
            options.bubbles.unwrap_or(config.trigger_bubbles),
            options.cancelable.unwrap_or(config.trigger_cancelable),
            options.detail,
        );
        let id = event.event().id;

        trace!(name = %name, node = node.id.raw(), "trigger");

        let filtered = name.is_namespaced();
        if filtered {
            self.inner.trigger_filters.borrow_mut().push((id, name));
        }

        let not_prevented = EventDispatcher::dispatch(&event, &node);

        if filtered {
            self.inner
                .trigger_filters
                .borrow_mut()
                .retain(|(filter_id, _)| *filter_id != id);
        }
        Ok(not_prevented)
    }

    /// Number of nodes with at least one handler.
    pub fn manager_count(&self) -> usize {
        self.inner.managers.borrow().len()
    }

    /// Handler records across all managers.
    pub fn handler_count(&self) -> usize {
        self.inner
            .managers
            .borrow()
            .iter()
            .map(|m| m.handler_count())
            .sum()
    }

    /// The manager of a node, if it has handlers.
    pub fn manager_for<'a>(&self, target: impl Into<Target<'a>>) -> Option<Rc<EventManager>> {
        let node = self.resolve(target.into()).ok().flatten()?;
        self.find_manager(&node)
    }

    /// Remove every handler and native subscription and cancel pending debounces.
    pub fn reset(&self) {
        let managers = std::mem::take(&mut *self.inner.managers.borrow_mut());
        let mut removed = 0;
        for manager in &managers {
            for record in manager.teardown() {
                self.cancel_pending(&record);
                removed += 1;
            }
        }
        debug!(managers = managers.len(), handlers = removed, "event registry reset");
    }

    fn register(
        &self,
        target: Target<'_>,
        name: &str,
        handler: Handler,
        selector: Option<(String, SelectorList)>,
        once: bool,
    ) -> Result<HandlerRecord> {
        let node = self.resolve_required(target)?;
        let name = EventName::parse(name)?;
        let record = HandlerRecord::new(name, handler, selector, once);

        let manager = self.manager_or_create(&node);
        let raw = record.name().raw();
        manager.subscribe(raw, || {
            let registry = Rc::downgrade(&self.inner);
            let weak_manager = Rc::downgrade(&manager);
            let listener: EventListenerCallback = Rc::new(move |event: &DomEvent| {
                let (Some(inner), Some(manager)) = (registry.upgrade(), weak_manager.upgrade())
                else {
                    return;
                };
                EventRegistry { inner }.fan_out(&manager, event);
            });
            listener
        });
        manager.push(record.clone());

        trace!(
            node = node.id.raw(),
            name = %record.name(),
            selector = record.selector(),
            once,
            "handler registered"
        );
        Ok(record)
    }

    fn resolve(&self, target: Target<'_>) -> Result<Option<Rc<Node>>> {
        Ok(match target {
            Target::Node(node) => Some(node.clone()),
            Target::Window => Some(self.inner.document.window().clone()),
            Target::Selector(selector) => self.inner.document.query_selector(selector)?,
        })
    }

    fn resolve_required(&self, target: Target<'_>) -> Result<Rc<Node>> {
        self.resolve(target)?.ok_or_else(|| match target {
            Target::Selector(selector) => EventError::TargetNotFound(selector.to_string()),
            Target::Node(node) => EventError::TargetNotFound(format!("node {}", node.id.raw())),
            Target::Window => EventError::TargetNotFound("window".to_string()),
        })
    }

    fn find_manager(&self, node: &Rc<Node>) -> Option<Rc<EventManager>> {
        self.inner
            .managers
            .borrow()
            .iter()
            .find(|m| Rc::ptr_eq(m.node(), node))
            .cloned()
    }

    fn manager_or_create(&self, node: &Rc<Node>) -> Rc<EventManager> {
        if let Some(manager) = self.find_manager(node) {
            return manager;
        }
        let manager = Rc::new(EventManager::new(node.clone()));
        self.inner.managers.borrow_mut().push(manager.clone());
        debug!(node = node.id.raw(), managers = self.manager_count(), "event manager created");
        manager
    }

    fn remove_matching(&self, node: &Rc<Node>, pred: impl FnMut(&HandlerRecord) -> bool) -> usize {
        let Some(manager) = self.find_manager(node) else {
            trace!(node = node.id.raw(), "no event manager for node");
            return 0;
        };

        let removed = manager.remove_where(pred);
        for record in &removed {
            self.cancel_pending(record);
        }

        if manager.is_empty() {
            self.inner
                .managers
                .borrow_mut()
                .retain(|m| !Rc::ptr_eq(m, &manager));
            debug!(node = node.id.raw(), managers = self.manager_count(), "event manager removed");
        }

        trace!(node = node.id.raw(), removed = removed.len(), "handlers removed");
        removed.len()
    }

    fn cancel_pending(&self, record: &HandlerRecord) {
        if !self.inner.config.cancel_debounce_on_remove {
            return;
        }
        if let Some(timer) = record.replace_pending(None) {
            self.inner.timers.clear_timer(timer);
        }
    }

    fn trigger_filter(&self, id: EventId) -> Option<EventName> {
        self.inner
            .trigger_filters
            .borrow()
            .iter()
            .rev()
            .find(|(filter_id, _)| *filter_id == id)
            .map(|(_, name)| name.clone())
    }

    /// Run the records of `manager` for one native event.
    fn fan_out(&self, manager: &Rc<EventManager>, event: &DomEvent) {
        let filter = self.trigger_filter(event.event().id);
        let records = manager.snapshot(event.event_type());
        let stopped = Cell::new(false);

        for record in records {
            if stopped.get() {
                break;
            }
            if !record.is_active() {
                continue;
            }
            if let Some(filter) = &filter {
                if !filter.selects(record.name()) {
                    continue;
                }
            }

            let delegate_target = match record.compiled_selector() {
                Some(selector) => {
                    let Some(target) = event.event().target() else {
                        continue;
                    };
                    let root = manager.node();
                    let scope = if root.is_window() {
                        self.inner.document.root()
                    } else {
                        root
                    };
                    match find_delegate_target(root, scope, selector, &target) {
                        Some(matched) => Some(matched),
                        None => continue,
                    }
                }
                None => None,
            };

            match record.debounce_delay() {
                Some(delay) => self.schedule(manager.node(), &record, event, delegate_target, delay),
                None => self.invoke(manager.node(), &record, event, delegate_target, &stopped),
            }
        }
    }

    /// Restart the record's debounce timer with this dispatch as the pending one.
    fn schedule(
        &self,
        node: &Rc<Node>,
        record: &HandlerRecord,
        event: &DomEvent,
        delegate_target: Option<Rc<Node>>,
        delay: Duration,
    ) {
        let timers = &self.inner.timers;
        if let Some(previous) = record.replace_pending(None) {
            timers.clear_timer(previous);
        }

        let registry = Rc::downgrade(&self.inner);
        let weak_record = record.downgrade();
        let node = node.clone();
        let event = event.clone();

        let id = timers.set_timeout(
            move || {
                let Some(record) = HandlerRecord::upgrade(&weak_record) else {
                    return;
                };
                record.replace_pending(None);
                let Some(inner) = registry.upgrade() else {
                    return;
                };
                if !record.is_active() {
                    trace!(name = %record.name(), "debounce fired for a removed handler");
                    return;
                }
                let stopped = Cell::new(false);
                EventRegistry { inner }.invoke(&node, &record, &event, delegate_target, &stopped);
            },
            delay,
        );
        record.replace_pending(Some(id));
    }

    fn invoke(
        &self,
        node: &Rc<Node>,
        record: &HandlerRecord,
        event: &DomEvent,
        delegate_target: Option<Rc<Node>>,
        stopped: &Cell<bool>,
    ) {
        if !record.claim() {
            return;
        }

        let this = record
            .scope()
            .or_else(|| delegate_target.clone().map(Scope::Node))
            .unwrap_or_else(|| Scope::Node(node.clone()));
        let ctx = EventContext {
            event,
            name: record.name(),
            current_target: node,
            this,
            delegate_target,
            stopped,
        };

        if self.inner.config.trace_dispatch {
            trace!(node = node.id.raw(), name = %record.name(), "invoking handler");
        }
        record.handler().call(&ctx);

        if record.is_once() {
            self.remove_matching(node, |r| r.same(record));
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("managers", &self.manager_count())
            .field("pending_timers", &self.inner.timers.pending_count())
            .finish()
    }
}
