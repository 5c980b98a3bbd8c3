//! In-process doubles for the engine's collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald_core::NotificationContext;

use crate::error::{Diagnostic, Result, RuleError};
use crate::factory::RuleFactory;
use crate::inspect::extract_entry_point;
use crate::ports::{ContextSource, NotificationSink, SourceGenerator};
use crate::rule::NotificationRule;

/// What a [`StaticRule`] does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behaviour {
    Holds,
    Never,
    EvaluateFaults,
    DescribeFaults,
    /// `evaluate` blocks for this long before answering `true`.
    Sleeps(Duration),
}

/// Calls currently inside `evaluate`, and the most seen at once, across
/// every rule one factory built.
#[derive(Default)]
pub(crate) struct Concurrency {
    running: AtomicUsize,
    pub(crate) peak: AtomicUsize,
}

pub(crate) struct StaticRule {
    entry_point: String,
    behaviour: Behaviour,
    message: String,
    pub(crate) evaluations: AtomicUsize,
    concurrency: Arc<Concurrency>,
}

impl StaticRule {
    pub(crate) fn new(entry_point: &str, behaviour: Behaviour) -> Self {
        Self {
            entry_point: entry_point.to_string(),
            behaviour,
            message: format!("{entry_point} fired"),
            evaluations: AtomicUsize::new(0),
            concurrency: Arc::default(),
        }
    }

    fn tracked(mut self, concurrency: &Arc<Concurrency>) -> Self {
        self.concurrency = Arc::clone(concurrency);
        self
    }

    pub(crate) fn holds(entry_point: &str) -> Self {
        Self::new(entry_point, Behaviour::Holds)
    }
}

impl NotificationRule for StaticRule {
    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn evaluate(&self, _context: &NotificationContext) -> Result<bool> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let running = self.concurrency.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.concurrency.peak.fetch_max(running, Ordering::SeqCst);
        if let Behaviour::Sleeps(pause) = self.behaviour {
            std::thread::sleep(pause);
        }
        self.concurrency.running.fetch_sub(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Holds | Behaviour::DescribeFaults | Behaviour::Sleeps(_) => Ok(true),
            Behaviour::Never => Ok(false),
            Behaviour::EvaluateFaults => Err(RuleError::Evaluation("evaluate: rule panicked".into())),
        }
    }

    fn describe(&self, _context: &NotificationContext) -> Result<String> {
        match self.behaviour {
            Behaviour::DescribeFaults => Err(RuleError::Evaluation("describe: rule panicked".into())),
            _ => Ok(self.message.clone()),
        }
    }
}

/// Factory that counts builds and picks behaviour from marker words in the
/// source: `never`, `evaluate_faults`, `describe_faults`, `broken`, and
/// `sleepy` (evaluate blocks for 1.5s).
#[derive(Default)]
pub(crate) struct CountingFactory {
    pub(crate) builds: AtomicUsize,
    pub(crate) concurrency: Arc<Concurrency>,
    delay: Duration,
    fail: AtomicBool,
}

impl CountingFactory {
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl RuleFactory for CountingFactory {
    fn build(&self, source: &str) -> Result<Arc<dyn NotificationRule>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let entry_point = extract_entry_point(source)?;
        if self.fail.load(Ordering::SeqCst) || source.contains("broken") {
            return Err(RuleError::Compile {
                entry_point,
                diagnostics: vec![Diagnostic {
                    line: 1,
                    message: "expected item".into(),
                }],
            });
        }
        let behaviour = if source.contains("never") {
            Behaviour::Never
        } else if source.contains("evaluate_faults") {
            Behaviour::EvaluateFaults
        } else if source.contains("describe_faults") {
            Behaviour::DescribeFaults
        } else if source.contains("sleepy") {
            Behaviour::Sleeps(Duration::from_millis(1500))
        } else {
            Behaviour::Holds
        };
        Ok(Arc::new(
            StaticRule::new(&entry_point, behaviour).tracked(&self.concurrency),
        ))
    }
}

/// Sink that records every message and can be told to fail.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub(crate) fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, owner: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((owner.to_string(), message.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(RuleError::Dispatch("transport down".into()));
        }
        Ok(())
    }
}

/// Source returning a fixed context; can be switched to failing.
pub(crate) struct StaticSource {
    context: NotificationContext,
    pub(crate) fetches: AtomicUsize,
    fail: AtomicBool,
}

impl StaticSource {
    pub(crate) fn new(context: NotificationContext) -> Self {
        Self {
            context,
            fetches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContextSource for StaticSource {
    async fn fetch_snapshot(&self) -> Result<NotificationContext> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RuleError::Fetch("feed unreachable".into()));
        }
        Ok(self.context.clone())
    }
}

/// Generator that returns canned source.
pub(crate) struct CannedGenerator {
    source: Option<String>,
    pub(crate) calls: AtomicUsize,
}

impl CannedGenerator {
    pub(crate) fn returning(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            source: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceGenerator for CannedGenerator {
    async fn generate(&self, _request: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.source
            .clone()
            .ok_or_else(|| RuleError::Generation("provider returned 503".into()))
    }
}
