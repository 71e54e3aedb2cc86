//! Scripted adapters for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::adapters::{
    task_name, ClientInfo, EmailSender, LeadSource, MessageGenerator, TaskCreator, TaskPriority,
    TaskRef,
};
use crate::core::{Lead, StageResult};
use crate::errors::SourceError;

/// Per-key queues of canned results.
///
/// Keys with an empty queue fall through to the adapter's default behaviour.
#[derive(Debug)]
pub struct Script<T> {
    queued: Mutex<HashMap<String, VecDeque<StageResult<T>>>>,
    calls: Mutex<Vec<String>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Script<T> {
    /// Queues `result` for the next call with `key`.
    pub fn push(&self, key: impl Into<String>, result: StageResult<T>) {
        self.queued
            .lock()
            .entry(key.into())
            .or_default()
            .push_back(result);
    }

    /// Queues `times` copies of `result` for `key`.
    pub fn push_n(&self, key: impl Into<String>, times: usize, result: StageResult<T>)
    where
        T: Clone,
    {
        let key = key.into();
        for _ in 0..times {
            self.push(key.clone(), result.clone());
        }
    }

    fn next(&self, key: &str) -> Option<StageResult<T>> {
        self.calls.lock().push(key.to_string());
        self.queued.lock().get_mut(key).and_then(VecDeque::pop_front)
    }

    /// Number of calls made with `key`.
    #[must_use]
    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|k| *k == key).count()
    }

    /// Total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Returns a fixed lead list.
#[derive(Debug, Default)]
pub struct StaticLeadSource {
    leads: Vec<Lead>,
    error: Option<SourceError>,
    connected: AtomicBool,
    list_calls: AtomicUsize,
}

impl StaticLeadSource {
    /// Creates a source returning `leads`.
    #[must_use]
    pub fn new(leads: Vec<Lead>) -> Self {
        Self {
            leads,
            error: None,
            connected: AtomicBool::new(true),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a source whose listing fails.
    #[must_use]
    pub fn failing(error: SourceError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(Vec::new())
        }
    }

    /// Sets the connection check result.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of listing calls.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadSource for StaticLeadSource {
    async fn list_leads(&self) -> Result<Vec<Lead>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.leads.clone()),
        }
    }

    async fn test_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Message generator scripted per lead id.
#[derive(Debug)]
pub struct ScriptedGenerator {
    /// Canned results keyed by lead id.
    pub script: Script<String>,
    panic_for: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    connected: AtomicBool,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Creates a generator that succeeds for every lead.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            panic_for: Mutex::new(HashSet::new()),
            latency: None,
            connected: AtomicBool::new(true),
        }
    }

    /// Sleeps for `latency` on every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Panics when asked to generate for `lead_id`.
    pub fn panic_for(&self, lead_id: impl Into<String>) {
        self.panic_for.lock().insert(lead_id.into());
    }

    /// Sets the connection check result.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageGenerator for ScriptedGenerator {
    async fn generate(&self, lead: &Lead, client: &ClientInfo, offer: &str) -> StageResult<String> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.panic_for.lock().contains(&lead.id) {
            panic!("generator blew up for {}", lead.id);
        }
        self.script.next(&lead.id).unwrap_or_else(|| {
            StageResult::Success(format!(
                "Hi {}, {} can help {} with {}.",
                lead.name, client.name, lead.company, offer
            ))
        })
    }

    async fn test_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A message accepted by [`ScriptedEmailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
}

/// Email sender scripted per recipient address.
#[derive(Debug)]
pub struct ScriptedEmailSender {
    /// Canned results keyed by recipient address.
    pub script: Script<()>,
    sent: Mutex<Vec<SentEmail>>,
    connected: AtomicBool,
}

impl Default for ScriptedEmailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEmailSender {
    /// Creates a sender that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }

    /// Sets the connection check result.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailSender for ScriptedEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> StageResult<()> {
        let result = self.script.next(to).unwrap_or(StageResult::Success(()));
        if result.is_success() {
            self.sent.lock().push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        result
    }

    async fn test_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A task filed with [`ScriptedTaskCreator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    /// Task name.
    pub name: String,
    /// Task description.
    pub description: String,
    /// Priority, if any.
    pub priority: Option<TaskPriority>,
    /// Due date, if any.
    pub due_date: Option<DateTime<Utc>>,
}

/// Task creator scripted per lead id.
#[derive(Debug)]
pub struct ScriptedTaskCreator {
    /// Canned results keyed by lead id.
    pub script: Script<TaskRef>,
    created: Mutex<Vec<CreatedTask>>,
    connected: AtomicBool,
}

impl Default for ScriptedTaskCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTaskCreator {
    /// Creates a task creator that accepts every task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            created: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Tasks created so far.
    #[must_use]
    pub fn created(&self) -> Vec<CreatedTask> {
        self.created.lock().clone()
    }

    /// Sets the connection check result.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskCreator for ScriptedTaskCreator {
    async fn create_task(
        &self,
        lead: &Lead,
        priority: Option<TaskPriority>,
        due_date: Option<DateTime<Utc>>,
    ) -> StageResult<TaskRef> {
        let result = self.script.next(&lead.id).unwrap_or_else(|| {
            StageResult::Success(TaskRef {
                id: format!("task-{}", lead.id),
                url: None,
            })
        });
        if result.is_success() {
            self.created.lock().push(CreatedTask {
                name: task_name(lead),
                description: lead.message().unwrap_or_default().to_string(),
                priority,
                due_date,
            });
        }
        result
    }

    async fn test_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;

    #[tokio::test]
    async fn test_script_replays_in_order_then_defaults() {
        let sender = ScriptedEmailSender::new();
        sender
            .script
            .push("a@x.io", StageResult::retryable(FailureKind::Transport, "421"));

        assert!(sender.send("a@x.io", "s", "b").await.is_retryable());
        assert!(sender.send("a@x.io", "s", "b").await.is_success());
        assert_eq!(sender.script.calls_for("a@x.io"), 2);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_generator_default_message() {
        let generator = ScriptedGenerator::new();
        let lead = Lead::new("1", "Ada", "Engines", "ada@engines.io");
        let message = generator
            .generate(&lead, &ClientInfo::new("Agency"), "growth")
            .await
            .into_result()
            .unwrap();
        assert_eq!(message, "Hi Ada, Agency can help Engines with growth.");
    }

    #[tokio::test]
    async fn test_static_source_failure() {
        let source = StaticLeadSource::failing(SourceError::auth("401"));
        assert!(source.list_leads().await.is_err());
        assert_eq!(source.list_calls(), 1);
    }
}
