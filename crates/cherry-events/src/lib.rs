//! # Cherry Events
//!
//! Namespaced event subscription, delegation, debouncing and scope binding
//! on top of the Cherry DOM.
//!
//! Widget code talks to an [`EventRegistry`]. The registry keeps one
//! [`EventManager`] per node; each manager installs a single native listener
//! per raw event type and fans every native event out to the handler records
//! registered for it, in registration order.
//!
//! ## Event names
//!
//! `"click"` is a bare name; `"menu.click"` is `click` in the `menu`
//! namespace. Namespaces group handlers so they can be removed or triggered
//! on their own; see [`EventName::selects`] for the matching rules.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = EventRegistry::new(document.clone());
//! let clicked = Handler::new(|ctx| println!("clicked {:?}", ctx.target()));
//!
//! registry.on(&button, "menu.click", clicked.clone())?;
//! button.click();
//! registry.off(&button, Some("menu.click"), Some(&clicked))?;
//! assert_eq!(registry.manager_count(), 0);
//! ```

use cherry_dom::DomError;
use thiserror::Error;

mod delegate;
pub mod handler;
pub mod manager;
pub mod name;
pub mod registry;
pub mod timers;

pub use handler::{EventContext, Handler, HandlerRecord, Scope};
pub use manager::EventManager;
pub use name::EventName;
pub use registry::{EventRegistry, Target, TriggerOptions};
pub use timers::{TimerCallback, TimerId, TimerQueue};

/// Errors that can occur when registering, removing or triggering handlers.
#[derive(Error, Debug)]
pub enum EventError {
    /// A selector target matched nothing.
    #[error("no element matches target {0}")]
    TargetNotFound(String),

    #[error("invalid event name {0:?}")]
    InvalidEventName(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Result type alias for event registry operations.
pub type Result<T> = std::result::Result<T, EventError>;
