//! User handlers, handler records and the per-invocation event context.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use cherry_dom::{DomEvent, Event, Node, SelectorList};

use crate::name::EventName;
use crate::timers::TimerId;

/// A user handler.
///
/// Handlers are compared by identity, so keep a clone of the `Handler` you
/// register if you want to remove it again by handler.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&EventContext<'_>)>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&EventContext<'_>) + 'static,
    {
        Self(Rc::new(f))
    }

    /// Identity comparison.
    pub fn same(&self, other: &Handler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, ctx: &EventContext<'_>) {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// The `this` a handler runs with.
#[derive(Clone)]
pub enum Scope {
    /// A node: the manager's node, or the matched element for delegated handlers.
    Node(Rc<Node>),
    /// A value bound with [`HandlerRecord::bind`].
    Value(Rc<dyn Any>),
}

impl Scope {
    /// Wrap an arbitrary value.
    pub fn value<T: 'static>(value: T) -> Self {
        Scope::Value(Rc::new(value))
    }

    pub fn node(&self) -> Option<&Rc<Node>> {
        match self {
            Scope::Node(node) => Some(node),
            Scope::Value(_) => None,
        }
    }

    /// Borrow a bound value of type `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Scope::Value(value) => value.downcast_ref(),
            Scope::Node(_) => None,
        }
    }
}

impl From<Rc<Node>> for Scope {
    fn from(node: Rc<Node>) -> Self {
        Scope::Node(node)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Node(node) => f.debug_tuple("Node").field(&node.id).finish(),
            Scope::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// What a handler receives. Wraps the native event instead of mutating it:
/// the delegate target and the stop flag live here.
pub struct EventContext<'a> {
    pub(crate) event: &'a DomEvent,
    pub(crate) name: &'a EventName,
    pub(crate) current_target: &'a Rc<Node>,
    pub(crate) this: Scope,
    pub(crate) delegate_target: Option<Rc<Node>>,
    pub(crate) stopped: &'a Cell<bool>,
}

impl<'a> EventContext<'a> {
    /// The native event.
    pub fn event(&self) -> &DomEvent {
        self.event
    }

    /// The base native event.
    pub fn native(&self) -> &Event {
        self.event.event()
    }

    /// The raw event type.
    pub fn event_type(&self) -> &str {
        self.event.event_type()
    }

    /// The full name the handler was registered under.
    pub fn name(&self) -> &EventName {
        self.name
    }

    /// The node the event was dispatched to.
    pub fn target(&self) -> Option<Rc<Node>> {
        self.native().target()
    }

    /// The node the handler is registered on.
    pub fn current_target(&self) -> &Rc<Node> {
        self.current_target
    }

    /// The handler's `this`.
    pub fn this(&self) -> &Scope {
        &self.this
    }

    /// The ancestor matched by a delegated handler's selector.
    pub fn delegate_target(&self) -> Option<&Rc<Node>> {
        self.delegate_target.as_ref()
    }

    /// The custom event payload, for triggered events.
    pub fn detail(&self) -> Option<&serde_json::Value> {
        self.event.detail()
    }

    /// Skip the remaining handlers of this dispatch and stop the native event.
    pub fn stop_immediate_propagation(&self) {
        self.stopped.set(true);
        self.native().stop_immediate_propagation();
    }

    pub fn stop_propagation(&self) {
        self.native().stop_propagation();
    }

    pub fn prevent_default(&self) {
        self.native().prevent_default();
    }

    /// Whether a handler of this dispatch stopped immediate propagation.
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

#[derive(Debug, Clone, Copy)]
struct Debounce {
    delay: Duration,
    pending: Option<TimerId>,
}

pub(crate) struct RecordState {
    name: EventName,
    handler: Handler,
    selector: Option<(String, SelectorList)>,
    once: bool,
    scope: RefCell<Option<Scope>>,
    debounce: Cell<Option<Debounce>>,
    removed: Cell<bool>,
    spent: Cell<bool>,
}

/// One `on`, `once` or `delegate` registration.
///
/// Returned to the caller so it can chain [`bind`](Self::bind) and
/// [`debounce`](Self::debounce); both take effect from the next dispatch.
#[derive(Clone)]
pub struct HandlerRecord(Rc<RecordState>);

impl HandlerRecord {
    pub(crate) fn new(
        name: EventName,
        handler: Handler,
        selector: Option<(String, SelectorList)>,
        once: bool,
    ) -> Self {
        Self(Rc::new(RecordState {
            name,
            handler,
            selector,
            once,
            scope: RefCell::new(None),
            debounce: Cell::new(None),
            removed: Cell::new(false),
            spent: Cell::new(false),
        }))
    }

    /// Run the handler with `scope` as its `this`.
    pub fn bind(&self, scope: impl Into<Scope>) -> &Self {
        *self.0.scope.borrow_mut() = Some(scope.into());
        self
    }

    /// Defer the handler until `delay` has passed without another dispatch.
    pub fn debounce(&self, delay: Duration) -> &Self {
        let pending = self.0.debounce.get().and_then(|d| d.pending);
        self.0.debounce.set(Some(Debounce { delay, pending }));
        self
    }

    pub fn name(&self) -> &EventName {
        &self.0.name
    }

    pub fn handler(&self) -> &Handler {
        &self.0.handler
    }

    /// The delegation selector, for delegated records.
    pub fn selector(&self) -> Option<&str> {
        self.0.selector.as_ref().map(|(source, _)| source.as_str())
    }

    pub(crate) fn compiled_selector(&self) -> Option<&SelectorList> {
        self.0.selector.as_ref().map(|(_, compiled)| compiled)
    }

    pub fn is_once(&self) -> bool {
        self.0.once
    }

    pub fn scope(&self) -> Option<Scope> {
        self.0.scope.borrow().clone()
    }

    pub fn debounce_delay(&self) -> Option<Duration> {
        self.0.debounce.get().map(|d| d.delay)
    }

    /// Whether a debounced invocation is waiting on the timer queue.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.0.debounce.get().and_then(|d| d.pending)
    }

    /// False once the record has been removed.
    pub fn is_active(&self) -> bool {
        !self.0.removed.get()
    }

    /// Identity comparison.
    pub fn same(&self, other: &HandlerRecord) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<RecordState> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<RecordState>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    pub(crate) fn mark_removed(&self) {
        self.0.removed.set(true);
    }

    /// For once records: true the first time only.
    pub(crate) fn claim(&self) -> bool {
        !self.0.once || !self.0.spent.replace(true)
    }

    /// Swap the pending debounce timer, returning the previous one.
    pub(crate) fn replace_pending(&self, timer: Option<TimerId>) -> Option<TimerId> {
        let mut debounce = self.0.debounce.get()?;
        let previous = std::mem::replace(&mut debounce.pending, timer);
        self.0.debounce.set(Some(debounce));
        previous
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("name", &self.0.name.full())
            .field("selector", &self.selector())
            .field("once", &self.0.once)
            .field("debounce", &self.debounce_delay())
            .field("active", &self.is_active())
            .finish()
    }
}
