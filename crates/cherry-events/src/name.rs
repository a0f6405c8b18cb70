//! Event name parsing and namespace matching.
//!
//! `"click"` is a bare name, `"menu.click"` is `click` in the `menu`
//! namespace. Namespaces may themselves contain dots (`"app.menu.click"`);
//! the raw type is always the segment after the last dot.

use std::fmt;

use crate::{EventError, Result};

/// A parsed, possibly namespaced, event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    full: String,
    /// Byte offset of the last `.`, if namespaced.
    split: Option<usize>,
}

impl EventName {
    /// Parse an event name.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || EventError::InvalidEventName(name.to_string());

        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let split = name.rfind('.');
        if let Some(index) = split {
            let (namespace, raw) = (&name[..index], &name[index + 1..]);
            if raw.is_empty() || namespace.split('.').any(str::is_empty) {
                return Err(invalid());
            }
        }

        Ok(Self {
            full: name.to_string(),
            split,
        })
    }

    /// The name as registered.
    pub fn full(&self) -> &str {
        &self.full
    }

    /// The native event type.
    pub fn raw(&self) -> &str {
        match self.split {
            Some(index) => &self.full[index + 1..],
            None => &self.full,
        }
    }

    /// Everything before the raw type.
    pub fn namespace(&self) -> Option<&str> {
        self.split.map(|index| &self.full[..index])
    }

    pub fn is_namespaced(&self) -> bool {
        self.split.is_some()
    }

    /// Whether a request for `self` (in `off`, `undelegate_*` or a namespaced
    /// `trigger`) selects a handler registered under `registered`.
    ///
    /// A bare request selects only bare registrations. A namespaced request
    /// selects registrations whose full name equals it or ends with it on a
    /// dot boundary.
    pub fn selects(&self, registered: &EventName) -> bool {
        if self.raw() != registered.raw() {
            return false;
        }
        if !self.is_namespaced() {
            return !registered.is_namespaced();
        }

        let full = registered.full();
        full == self.full
            || (full.len() > self.full.len()
                && full.ends_with(self.full.as_str())
                && full.as_bytes()[full.len() - self.full.len() - 1] == b'.')
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}
