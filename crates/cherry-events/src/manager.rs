//! Per-node event manager.
//!
//! Multiplexes one native listener per raw event type into the ordered list
//! of handler records registered for that type on the node.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use cherry_dom::{AddEventListenerOptions, EventListenerCallback, ListenerId, Node};
use tracing::trace;

use crate::handler::HandlerRecord;

/// The fan-out state of one node.
pub struct EventManager {
    node: Rc<Node>,
    /// Raw type -> records in registration order.
    handlers: RefCell<BTreeMap<String, Vec<HandlerRecord>>>,
    /// Raw type -> the native listener installed for it.
    native: RefCell<HashMap<String, ListenerId>>,
}

impl EventManager {
    pub(crate) fn new(node: Rc<Node>) -> Self {
        Self {
            node,
            handlers: RefCell::new(BTreeMap::new()),
            native: RefCell::new(HashMap::new()),
        }
    }

    /// The observed node.
    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    /// Total handler records across all event types.
    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().values().map(Vec::len).sum()
    }

    /// Handler records for one raw event type.
    pub fn handler_count_for(&self, raw: &str) -> usize {
        self.handlers.borrow().get(raw).map(Vec::len).unwrap_or(0)
    }

    /// Number of native listeners installed on the node by this manager.
    pub fn native_subscription_count(&self) -> usize {
        self.native.borrow().len()
    }

    pub fn is_subscribed(&self, raw: &str) -> bool {
        self.native.borrow().contains_key(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.handler_count() == 0
    }

    /// Every record, grouped by raw type in lexical order, each group in
    /// registration order.
    pub fn records(&self) -> Vec<HandlerRecord> {
        self.handlers.borrow().values().flatten().cloned().collect()
    }

    /// Install the native listener for `raw` unless one is already installed.
    pub(crate) fn subscribe(&self, raw: &str, make_listener: impl FnOnce() -> EventListenerCallback) {
        if self.is_subscribed(raw) {
            return;
        }
        let id = self.node.event_target.add_event_listener(
            raw,
            make_listener(),
            AddEventListenerOptions::default(),
        );
        self.native.borrow_mut().insert(raw.to_string(), id);
        trace!(node = self.node.id.raw(), raw, "native subscription added");
    }

    pub(crate) fn push(&self, record: HandlerRecord) {
        self.handlers
            .borrow_mut()
            .entry(record.name().raw().to_string())
            .or_default()
            .push(record);
    }

    /// The records of one raw type as they are now; dispatch iterates this copy.
    pub(crate) fn snapshot(&self, raw: &str) -> Vec<HandlerRecord> {
        self.handlers.borrow().get(raw).cloned().unwrap_or_default()
    }

    /// Remove the records matching `pred`, unsubscribing raw types left empty.
    pub(crate) fn remove_where(&self, mut pred: impl FnMut(&HandlerRecord) -> bool) -> Vec<HandlerRecord> {
        let mut removed = Vec::new();
        let mut emptied = Vec::new();

        {
            let mut handlers = self.handlers.borrow_mut();
            for (raw, list) in handlers.iter_mut() {
                list.retain(|record| {
                    if pred(record) {
                        record.mark_removed();
                        removed.push(record.clone());
                        false
                    } else {
                        true
                    }
                });
                if list.is_empty() {
                    emptied.push(raw.clone());
                }
            }
            for raw in &emptied {
                handlers.remove(raw);
            }
        }

        for raw in emptied {
            self.unsubscribe(&raw);
        }
        removed
    }

    /// Drop every record and native listener.
    pub(crate) fn teardown(&self) -> Vec<HandlerRecord> {
        self.remove_where(|_| true)
    }

    fn unsubscribe(&self, raw: &str) {
        if let Some(id) = self.native.borrow_mut().remove(raw) {
            self.node.event_target.remove_event_listener(raw, id);
            trace!(node = self.node.id.raw(), raw, "native subscription removed");
        }
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("node", &self.node.id)
            .field("handler_count", &self.handler_count())
            .field("native_subscriptions", &self.native_subscription_count())
            .finish()
    }
}
