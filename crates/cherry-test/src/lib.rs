//! # Cherry Test
//!
//! Scenario harness and cross-crate tests for the Cherry event registry.
//!
//! Scenarios are JSON files: an HTML fixture plus a list of steps that
//! register handlers, fire events, move the timer clock and check which
//! handlers ran. Every handler named in a scenario records its name in a
//! shared [`CallLog`] when invoked.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cherry_test::ScenarioRunner;
//!
//! let summary = ScenarioRunner::new().run_all("crates/cherry-test/scenarios")?;
//! println!("Passed: {}/{}", summary.passed, summary.total);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use cherry_common::{init_logging, LogConfig};
use cherry_dom::{Document, Node};
use cherry_events::{EventError, EventRegistry, Handler, Target, TriggerOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[cfg(test)]
mod debounce;
#[cfg(test)]
mod delegation;

/// Errors that can occur in testing.
#[derive(Error, Debug)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scenario: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Step {step}: expected {expected}, got {actual}")]
    Mismatch {
        step: usize,
        expected: String,
        actual: String,
    },
}

/// Test result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
}

/// Individual scenario result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Pass,
            duration_ms,
            message: None,
            expected: None,
            actual: None,
        }
    }

    pub fn fail_with_diff(
        name: impl Into<String>,
        duration_ms: u64,
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Fail,
            duration_ms,
            message: Some(message.into()),
            expected: Some(expected.into()),
            actual: Some(actual.into()),
        }
    }

    pub fn error(name: impl Into<String>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Error,
            duration_ms,
            message: Some(message.into()),
            expected: None,
            actual: None,
        }
    }
}

/// Aggregated scenario results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: TestResult) {
        self.total += 1;
        self.duration_ms += result.duration_ms;

        match result.status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Error => self.errors += 1,
        }

        self.results.push(result);
    }

    /// Results that did not pass.
    pub fn problems(&self) -> impl Iterator<Item = &TestResult> {
        self.results
            .iter()
            .filter(|r| r.status != TestStatus::Pass)
    }
}

/// Shared record of handler invocations, in call order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that appends `label` on each call.
    pub fn handler(&self, label: &str) -> Handler {
        let log = self.0.clone();
        let label = label.to_string();
        Handler::new(move |_| log.borrow_mut().push(label.clone()))
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Return the calls so far and clear the log.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// A parsed document with a registry attached.
pub struct Fixture {
    pub document: Rc<Document>,
    pub registry: EventRegistry,
}

impl Fixture {
    pub fn new(html: &str) -> Result<Self, TestError> {
        let document = Rc::new(
            Document::parse_html(html).map_err(|e| TestError::Fixture(e.to_string()))?,
        );
        let registry = EventRegistry::new(document.clone());
        Ok(Self { document, registry })
    }

    /// The element with the given id.
    pub fn element(&self, id: &str) -> Result<Rc<Node>, TestError> {
        self.document
            .get_element_by_id(id)
            .ok_or_else(|| TestError::Fixture(format!("no element with id {id:?}")))
    }

    /// The first element matching `selector`.
    pub fn select(&self, selector: &str) -> Result<Rc<Node>, TestError> {
        self.document
            .query_selector(selector)
            .map_err(|e| TestError::Fixture(e.to_string()))?
            .ok_or_else(|| TestError::Fixture(format!("nothing matches {selector:?}")))
    }
}

/// A data-driven registry scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub html: String,
    pub steps: Vec<Step>,
}

/// One scenario step. Targets are selectors, or `"window"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    On {
        target: String,
        name: String,
        handler: String,
        #[serde(default)]
        once: bool,
        #[serde(default)]
        debounce_ms: Option<u64>,
    },
    Delegate {
        root: String,
        selector: String,
        name: String,
        handler: String,
    },
    Off {
        target: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        handler: Option<String>,
    },
    /// `selector` and `name`: by selector. `handler` and `name`: by handler.
    /// Otherwise every delegated handler `name` selects.
    Undelegate {
        root: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        handler: Option<String>,
    },
    Click {
        target: String,
    },
    Trigger {
        target: String,
        name: String,
        #[serde(default)]
        detail: Option<serde_json::Value>,
    },
    Advance {
        ms: u64,
    },
    /// Compare and clear the call log.
    Expect {
        calls: Vec<String>,
    },
    ExpectManagers {
        count: usize,
    },
    ExpectNativeListeners {
        target: String,
        event: String,
        count: usize,
    },
}

/// Runs [`Scenario`]s.
#[derive(Debug, Default)]
pub struct ScenarioRunner;

impl ScenarioRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run every `.json` scenario under `dir`.
    pub fn run_all(&self, dir: impl AsRef<Path>) -> Result<TestSummary, TestError> {
        let dir = dir.as_ref();
        info!(?dir, "Running scenarios");

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| TestError::Io(e.into()))?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                files.push(entry.into_path());
            }
        }

        let mut summary = TestSummary::new();
        for path in files {
            summary.add(self.run_file(&path)?);
        }

        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            "Scenario run complete"
        );
        Ok(summary)
    }

    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<TestResult, TestError> {
        let path = path.as_ref();
        debug!(?path, "Running scenario file");

        let source = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&source)?;
        Ok(self.run(&scenario))
    }

    pub fn run(&self, scenario: &Scenario) -> TestResult {
        let start = Instant::now();
        let outcome = self.execute(scenario);
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => TestResult::pass(&scenario.name, duration_ms),
            Err(TestError::Mismatch {
                step,
                expected,
                actual,
            }) => TestResult::fail_with_diff(
                &scenario.name,
                duration_ms,
                format!("step {step} mismatch"),
                expected,
                actual,
            ),
            Err(e) => TestResult::error(&scenario.name, duration_ms, e.to_string()),
        }
    }

    fn execute(&self, scenario: &Scenario) -> Result<(), TestError> {
        let fixture = Fixture::new(&scenario.html)?;
        let log = CallLog::new();
        let mut handlers: HashMap<String, Handler> = HashMap::new();
        let mut handler = |label: &str| {
            handlers
                .entry(label.to_string())
                .or_insert_with(|| log.handler(label))
                .clone()
        };

        let registry = &fixture.registry;
        for (index, step) in scenario.steps.iter().enumerate() {
            let mismatch = |expected: String, actual: String| TestError::Mismatch {
                step: index,
                expected,
                actual,
            };

            match step {
                Step::On {
                    target,
                    name,
                    handler: label,
                    once,
                    debounce_ms,
                } => {
                    let h = handler(label.as_str());
                    let record = if *once {
                        registry.once(target_of(target), name, h)?
                    } else {
                        registry.on(target_of(target), name, h)?
                    };
                    if let Some(ms) = debounce_ms {
                        record.debounce(Duration::from_millis(*ms));
                    }
                }
                Step::Delegate {
                    root,
                    selector,
                    name,
                    handler: label,
                } => {
                    let h = handler(label.as_str());
                    registry.delegate(target_of(root), selector, name, h)?;
                }
                Step::Off {
                    target,
                    name,
                    handler: label,
                } => {
                    let h = label.as_deref().map(&mut handler);
                    registry.off(target_of(target), name.as_deref(), h.as_ref())?;
                }
                Step::Undelegate {
                    root,
                    selector,
                    name,
                    handler: label,
                } => match (selector, name, label) {
                    (Some(selector), Some(name), _) => {
                        registry.undelegate_by_selector(target_of(root), selector, name)?;
                    }
                    (None, Some(name), Some(label)) => {
                        let h = handler(label.as_str());
                        registry.undelegate_by_handler(target_of(root), name, &h)?;
                    }
                    _ => {
                        registry.undelegate_all(target_of(root), name.as_deref())?;
                    }
                },
                Step::Click { target } => {
                    resolve(&fixture, target)?.click();
                }
                Step::Trigger {
                    target,
                    name,
                    detail,
                } => {
                    let mut options = TriggerOptions::new();
                    if let Some(detail) = detail {
                        options = options.detail(detail.clone());
                    }
                    registry.trigger(target_of(target), name, options)?;
                }
                Step::Advance { ms } => {
                    registry.timers().advance(Duration::from_millis(*ms));
                }
                Step::Expect { calls } => {
                    let actual = log.take();
                    if &actual != calls {
                        return Err(mismatch(format!("{calls:?}"), format!("{actual:?}")));
                    }
                }
                Step::ExpectManagers { count } => {
                    let actual = registry.manager_count();
                    if actual != *count {
                        return Err(mismatch(
                            format!("{count} managers"),
                            format!("{actual} managers"),
                        ));
                    }
                }
                Step::ExpectNativeListeners {
                    target,
                    event,
                    count,
                } => {
                    let actual = resolve(&fixture, target)?
                        .event_target
                        .listener_count(event);
                    if actual != *count {
                        return Err(mismatch(
                            format!("{count} {event} listeners"),
                            format!("{actual} {event} listeners"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Install a subscriber for scenario runs, filtered by `CHERRY_TEST_LOG`
/// (default `cherry_events=debug`). Later calls are no-ops.
pub fn init_test_logging() {
    let filter =
        std::env::var("CHERRY_TEST_LOG").unwrap_or_else(|_| "cherry_events=debug".to_string());
    let config = LogConfig::debug().with_filter(filter);
    if let Err(e) = init_logging(config) {
        debug!(error = %e, category = e.category(), "test logging already initialized");
    }
}

fn target_of(target: &str) -> Target<'_> {
    match target {
        "window" => Target::Window,
        selector => Target::Selector(selector),
    }
}

fn resolve(fixture: &Fixture, target: &str) -> Result<Rc<Node>, TestError> {
    match target {
        "window" => Ok(fixture.document.window().clone()),
        selector => fixture.select(selector),
    }
}
