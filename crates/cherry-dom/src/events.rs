//! # DOM Events
//!
//! Native event types and the dispatch mechanism the event registry sits on.
//! Supports capture and bubble phases, stopPropagation, stopImmediatePropagation
//! and preventDefault. The propagation path runs from the target through its
//! ancestors and the document up to the window.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::{Node, NodeId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Create a new unique EventId.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one native listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Event phases as per the DOM spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventPhase {
    /// No event is being processed.
    None = 0,
    /// Event is propagating through target's ancestors (capture).
    Capturing = 1,
    /// Event has arrived at the event target.
    AtTarget = 2,
    /// Event is propagating back up through ancestors (bubble).
    Bubbling = 3,
}

/// Common event interface for all DOM events.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique ID for this event.
    pub id: EventId,
    /// Event type (e.g., "click", "keydown").
    pub event_type: String,
    /// Whether the event bubbles.
    pub bubbles: bool,
    /// Whether the event is cancelable.
    pub cancelable: bool,
    /// Timestamp when the event was created.
    pub timestamp: u64,
    /// Whether the event is trusted (dispatched by the host rather than by script).
    pub is_trusted: bool,
    phase: Cell<EventPhase>,
    target: RefCell<Option<Rc<Node>>>,
    current_target: RefCell<Option<Rc<Node>>>,
    propagation_stopped: Cell<bool>,
    immediate_propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
    dispatching: Cell<bool>,
}

impl Event {
    /// Create a new event.
    pub fn new(event_type: &str, bubbles: bool, cancelable: bool) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.to_string(),
            bubbles,
            cancelable,
            timestamp: Self::current_timestamp(),
            is_trusted: false,
            phase: Cell::new(EventPhase::None),
            target: RefCell::new(None),
            current_target: RefCell::new(None),
            propagation_stopped: Cell::new(false),
            immediate_propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
            dispatching: Cell::new(false),
        }
    }

    /// Create a trusted event (from the host).
    pub fn new_trusted(event_type: &str, bubbles: bool, cancelable: bool) -> Self {
        let mut event = Self::new(event_type, bubbles, cancelable);
        event.is_trusted = true;
        event
    }

    /// Get the current phase.
    pub fn phase(&self) -> EventPhase {
        self.phase.get()
    }

    /// Get the target node.
    pub fn target(&self) -> Option<Rc<Node>> {
        self.target.borrow().clone()
    }

    /// Get the target node ID.
    pub fn target_id(&self) -> Option<NodeId> {
        self.target.borrow().as_ref().map(|n| n.id)
    }

    /// Get the node currently handling the event.
    pub fn current_target(&self) -> Option<Rc<Node>> {
        self.current_target.borrow().clone()
    }

    /// Stop propagation of the event.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    /// Stop immediate propagation of the event.
    pub fn stop_immediate_propagation(&self) {
        self.propagation_stopped.set(true);
        self.immediate_propagation_stopped.set(true);
    }

    /// Prevent the default action.
    pub fn prevent_default(&self) {
        if self.cancelable {
            self.default_prevented.set(true);
        }
    }

    /// Check if propagation is stopped.
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    /// Check if immediate propagation is stopped.
    pub fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped.get()
    }

    /// Check if the default action was prevented.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub(crate) fn set_phase(&self, phase: EventPhase) {
        self.phase.set(phase);
    }

    pub(crate) fn set_target(&self, target: Rc<Node>) {
        *self.target.borrow_mut() = Some(target);
    }

    pub(crate) fn set_current_target(&self, target: Option<Rc<Node>>) {
        *self.current_target.borrow_mut() = target;
    }

    fn current_timestamp() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Mouse event data.
#[derive(Debug, Clone, Default)]
pub struct MouseEventData {
    /// X coordinate relative to the viewport.
    pub client_x: f64,
    /// Y coordinate relative to the viewport.
    pub client_y: f64,
    /// Which mouse button triggered the event.
    pub button: i16,
    /// Currently pressed buttons bitmask.
    pub buttons: u16,
    pub ctrl_key: bool,
    pub alt_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

/// Keyboard event data.
#[derive(Debug, Clone, Default)]
pub struct KeyboardEventData {
    /// The key value.
    pub key: String,
    /// The physical key code.
    pub code: String,
    /// Whether this is a repeat event.
    pub repeat: bool,
    pub ctrl_key: bool,
    pub alt_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

/// Focus event data.
#[derive(Debug, Clone, Default)]
pub struct FocusEventData {
    /// The element losing or gaining focus.
    pub related_target: Option<NodeId>,
}

/// Payload of a script-created event.
#[derive(Debug, Clone, Default)]
pub struct CustomEventData {
    pub detail: Option<serde_json::Value>,
}

/// DOM event with type-specific data.
#[derive(Debug, Clone)]
pub enum DomEvent {
    /// Generic event.
    Generic(Event),
    /// Mouse event.
    Mouse(Event, MouseEventData),
    /// Keyboard event.
    Keyboard(Event, KeyboardEventData),
    /// Focus event.
    Focus(Event, FocusEventData),
    /// CustomEvent with an optional detail payload.
    Custom(Event, CustomEventData),
}

impl DomEvent {
    /// Get the base event.
    pub fn event(&self) -> &Event {
        match self {
            DomEvent::Generic(e) => e,
            DomEvent::Mouse(e, _) => e,
            DomEvent::Keyboard(e, _) => e,
            DomEvent::Focus(e, _) => e,
            DomEvent::Custom(e, _) => e,
        }
    }

    /// Shorthand for the base event's type.
    pub fn event_type(&self) -> &str {
        &self.event().event_type
    }

    /// The detail payload of a custom event.
    pub fn detail(&self) -> Option<&serde_json::Value> {
        match self {
            DomEvent::Custom(_, data) => data.detail.as_ref(),
            _ => None,
        }
    }

    /// Create a generic event.
    pub fn generic(event_type: &str, bubbles: bool, cancelable: bool) -> Self {
        DomEvent::Generic(Event::new(event_type, bubbles, cancelable))
    }

    /// Create a mouse event.
    pub fn mouse(event_type: &str, bubbles: bool, data: MouseEventData) -> Self {
        let event = Event::new_trusted(event_type, bubbles, true);
        DomEvent::Mouse(event, data)
    }

    /// Create a keyboard event.
    pub fn keyboard(event_type: &str, data: KeyboardEventData) -> Self {
        let event = Event::new_trusted(event_type, true, true);
        DomEvent::Keyboard(event, data)
    }

    /// Create a focus event.
    pub fn focus(event_type: &str, data: FocusEventData) -> Self {
        // focus/blur don't bubble, focusin/focusout do
        let bubbles = event_type == "focusin" || event_type == "focusout";
        let event = Event::new_trusted(event_type, bubbles, false);
        DomEvent::Focus(event, data)
    }

    /// Create a custom (untrusted) event.
    pub fn custom(
        event_type: &str,
        bubbles: bool,
        cancelable: bool,
        detail: Option<serde_json::Value>,
    ) -> Self {
        let event = Event::new(event_type, bubbles, cancelable);
        DomEvent::Custom(event, CustomEventData { detail })
    }
}

/// Options for adding an event listener.
#[derive(Debug, Clone, Default)]
pub struct AddEventListenerOptions {
    /// If true, the listener is invoked during capture phase.
    pub capture: bool,
    /// If true, the listener is automatically removed after first invocation.
    pub once: bool,
}

/// An event listener callback.
pub type EventListenerCallback = Rc<dyn Fn(&DomEvent) + 'static>;

/// A registered event listener.
#[derive(Clone)]
struct EventListener {
    id: ListenerId,
    callback: EventListenerCallback,
    options: AddEventListenerOptions,
    /// Set on removal so an in-flight dispatch skips the listener.
    removed: Rc<Cell<bool>>,
}

/// Event target mixin - manages native event listeners for a node.
#[derive(Default)]
pub struct EventTarget {
    /// Listeners keyed by event type, in registration order.
    listeners: RefCell<HashMap<String, Vec<EventListener>>>,
}

impl EventTarget {
    /// Create a new event target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event listener.
    pub fn add_event_listener(
        &self,
        event_type: &str,
        callback: EventListenerCallback,
        options: AddEventListenerOptions,
    ) -> ListenerId {
        let id = ListenerId::next();
        let mut listeners = self.listeners.borrow_mut();
        let list = listeners.entry(event_type.to_string()).or_default();
        list.push(EventListener {
            id,
            callback,
            options,
            removed: Rc::new(Cell::new(false)),
        });
        trace!(event_type, ?id, "native listener added");
        id
    }

    /// Remove one event listener. Returns false if it was not registered.
    pub fn remove_event_listener(&self, event_type: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(event_type) else {
            return false;
        };
        let Some(index) = list.iter().position(|l| l.id == id) else {
            return false;
        };

        let listener = list.remove(index);
        listener.removed.set(true);
        if list.is_empty() {
            listeners.remove(event_type);
        }
        trace!(event_type, ?id, "native listener removed");
        true
    }

    /// Remove every listener for an event type.
    pub fn remove_all_listeners(&self, event_type: &str) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(list) = listeners.remove(event_type) {
            for listener in list {
                listener.removed.set(true);
            }
        }
    }

    /// Check if there are any listeners for an event type.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listener_count(event_type) > 0
    }

    /// Number of listeners for an event type.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .borrow()
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of listeners across all event types.
    pub fn total_listener_count(&self) -> usize {
        self.listeners.borrow().values().map(Vec::len).sum()
    }

    /// Invoke listeners for an event in the given phase.
    ///
    /// Works on a snapshot of the list, so listeners may add or remove
    /// listeners on this target while being called.
    pub fn invoke_listeners(&self, event: &DomEvent, phase: EventPhase) {
        let event_type = event.event_type();
        let snapshot = match self.listeners.borrow().get(event_type) {
            Some(list) => list.clone(),
            None => return,
        };

        for listener in snapshot {
            if listener.removed.get() {
                continue;
            }

            let should_fire = match phase {
                EventPhase::Capturing => listener.options.capture,
                EventPhase::AtTarget => true,
                EventPhase::Bubbling => !listener.options.capture,
                EventPhase::None => false,
            };
            if !should_fire {
                continue;
            }

            if listener.options.once {
                self.remove_event_listener(event_type, listener.id);
            }

            (listener.callback)(event);

            if event.event().immediate_propagation_stopped() {
                break;
            }
        }
    }
}

impl std::fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTarget")
            .field("listener_count", &self.total_listener_count())
            .finish()
    }
}

/// Event dispatcher for propagating events through the DOM tree.
pub struct EventDispatcher;

impl EventDispatcher {
    /// Dispatch an event to a target node.
    /// Returns true if the event was not prevented.
    pub fn dispatch(event: &DomEvent, target: &Rc<Node>) -> bool {
        let base = event.event();
        if base.dispatching.replace(true) {
            trace!(event_type = %base.event_type, "event is already being dispatched");
            return !base.default_prevented();
        }

        base.set_target(target.clone());

        // Ancestors ordered from the window down to the parent.
        let mut ancestors = Vec::new();
        let mut current = target.event_parent();
        while let Some(node) = current {
            current = node.event_parent();
            ancestors.push(node);
        }
        ancestors.reverse();

        trace!(
            event_type = %base.event_type,
            target = target.id.raw(),
            path_len = ancestors.len() + 1,
            "dispatching event"
        );

        // Capture phase (root to target, excluding target)
        base.set_phase(EventPhase::Capturing);
        for node in &ancestors {
            if base.propagation_stopped() {
                break;
            }
            base.set_current_target(Some(node.clone()));
            node.event_target
                .invoke_listeners(event, EventPhase::Capturing);
        }

        // At target phase
        if !base.propagation_stopped() {
            base.set_phase(EventPhase::AtTarget);
            base.set_current_target(Some(target.clone()));
            target
                .event_target
                .invoke_listeners(event, EventPhase::AtTarget);
        }

        // Bubble phase (target to root, excluding target)
        if base.bubbles && !base.propagation_stopped() {
            base.set_phase(EventPhase::Bubbling);
            for node in ancestors.iter().rev() {
                if base.propagation_stopped() {
                    break;
                }
                base.set_current_target(Some(node.clone()));
                node.event_target
                    .invoke_listeners(event, EventPhase::Bubbling);
            }
        }

        base.set_phase(EventPhase::None);
        base.set_current_target(None);
        base.dispatching.set(false);

        !base.default_prevented()
    }
}

impl Node {
    /// Synchronously dispatch a trusted `click` on this node, as `HTMLElement.click()` does.
    pub fn click(self: &Rc<Self>) -> bool {
        let event = DomEvent::mouse("click", true, MouseEventData::default());
        EventDispatcher::dispatch(&event, self)
    }
}
