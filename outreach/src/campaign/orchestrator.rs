//! Campaign orchestration: fan leads out to a bounded worker pool.

use crate::adapters::{Adapters, EmailSender, LeadSource, MessageGenerator, TaskCreator};
use crate::cancellation::{CancellationToken, CAMPAIGN_CANCELLED};
use crate::core::{Failure, Lead, StageResult};
use crate::errors::{FailureKind, OutreachError, SourceError};
use crate::events::{EventSink, NoOpEventSink, CAMPAIGN_COMPLETED, CAMPAIGN_STARTED};
use crate::metrics::{CampaignReport, MetricsAggregator};
use crate::pipeline::{
    CallSite, LeadPipeline, OutreachContent, PipelineResources, RetryExecutor, RetryPolicies,
    RetryPolicy, RetryStats, TaskSettings,
};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Default worker count.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default bound on a single external call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Reason recorded on leads that panicked inside their pipeline.
pub const INTERNAL_ERROR: &str = "internal error";

/// Campaign run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignOptions {
    /// Worker pool size. Clamped to `1..=lead count`.
    pub concurrency: usize,
    /// Bound on each external call.
    pub call_timeout: Option<Duration>,
    /// Campaign-wide deadline, measured from the start of processing.
    pub deadline: Option<Duration>,
    /// Retry policy per adapter category.
    pub policies: RetryPolicies,
    /// Client info and offer text.
    pub content: OutreachContent,
    /// Follow-up task priority and due date.
    pub task_settings: TaskSettings,
    /// Stop calling an adapter for later leads once it rejects credentials.
    pub halt_on_auth_failure: bool,
}

impl Default for CampaignOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            deadline: None,
            policies: RetryPolicies::default(),
            content: OutreachContent::default(),
            task_settings: TaskSettings::default(),
            halt_on_auth_failure: false,
        }
    }
}

impl CampaignOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the campaign deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the retry policies.
    #[must_use]
    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Sets the outreach content.
    #[must_use]
    pub fn with_content(mut self, content: OutreachContent) -> Self {
        self.content = content;
        self
    }

    /// Sets the task settings.
    #[must_use]
    pub fn with_task_settings(mut self, settings: TaskSettings) -> Self {
        self.task_settings = settings;
        self
    }

    /// Enables the auth short-circuit.
    #[must_use]
    pub fn with_halt_on_auth_failure(mut self, enabled: bool) -> Self {
        self.halt_on_auth_failure = enabled;
        self
    }
}

/// Result of the pre-flight connection checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    /// Lead source reachable.
    pub source: bool,
    /// Message generator reachable.
    pub generator: bool,
    /// Email transport reachable.
    pub email: bool,
    /// Task tracker reachable.
    pub tasks: bool,
}

impl ConnectionCheck {
    /// Returns true if at least one adapter answered.
    #[must_use]
    pub fn any_reachable(&self) -> bool {
        self.source || self.generator || self.email || self.tasks
    }

    /// Names of the adapters that failed.
    #[must_use]
    pub fn unreachable(&self) -> Vec<&'static str> {
        [
            ("lead_source", self.source),
            ("message_generator", self.generator),
            ("email_sender", self.email),
            ("task_creator", self.tasks),
        ]
        .into_iter()
        .filter_map(|(name, ok)| (!ok).then_some(name))
        .collect()
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct CampaignOutcome {
    /// The final report.
    pub report: CampaignReport,
    /// Every lead in a terminal status, in source order.
    pub leads: Vec<Lead>,
    /// Retry counters across all calls.
    pub retry_stats: RetryStats,
}

/// Runs a campaign over a set of adapters.
pub struct CampaignOrchestrator {
    adapters: Adapters,
    options: CampaignOptions,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl CampaignOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(adapters: Adapters, options: CampaignOptions) -> Self {
        Self {
            adapters,
            options,
            sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Emits campaign events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The campaign cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// The run options.
    #[must_use]
    pub fn options(&self) -> &CampaignOptions {
        &self.options
    }

    /// Checks every adapter's connection.
    ///
    /// Fails only when no adapter is reachable.
    pub async fn preflight(&self) -> Result<ConnectionCheck, OutreachError> {
        let (source, generator, email, tasks) = futures::join!(
            self.adapters.source.test_connection(),
            self.adapters.generator.test_connection(),
            self.adapters.email.test_connection(),
            self.adapters.tasks.test_connection(),
        );
        let check = ConnectionCheck {
            source,
            generator,
            email,
            tasks,
        };

        let unreachable = check.unreachable();
        if !check.any_reachable() {
            return Err(OutreachError::Setup(format!(
                "no adapter reachable ({})",
                unreachable.join(", ")
            )));
        }
        for adapter in unreachable {
            warn!(adapter, "Connection check failed, continuing");
        }
        Ok(check)
    }

    /// Runs the campaign to completion.
    ///
    /// Only setup problems are returned as errors; lead failures end up in
    /// the report.
    pub async fn run(&self) -> Result<CampaignOutcome, OutreachError> {
        self.options.policies.validate()?;
        self.preflight().await?;

        let mut resources = PipelineResources::new(self.adapters.clone(), self.sink.clone(), self.cancel.clone())
            .with_policies(self.options.policies.clone())
            .with_content(self.options.content.clone())
            .with_task_settings(self.options.task_settings)
            .with_halt_on_auth_failure(self.options.halt_on_auth_failure);
        if let Some(timeout) = self.options.call_timeout {
            resources = resources.with_call_timeout(timeout);
        }
        let resources = Arc::new(resources);

        let leads = self.list_leads(&resources.policies().data_store).await?;
        let run_id = Uuid::now_v7();
        let lead_count = leads.len();
        let workers = self.options.concurrency.clamp(1, lead_count.max(1));
        let aggregator = Arc::new(MetricsAggregator::new(run_id));

        info!(%run_id, leads = lead_count, workers, "Starting outreach campaign");
        self.sink.try_emit(
            CAMPAIGN_STARTED,
            Some(serde_json::json!({
                "run_id": run_id,
                "leads": lead_count,
                "workers": workers,
            })),
        );

        let deadline = self
            .options
            .deadline
            .map(|d| self.cancel.cancel_after(d, "campaign deadline elapsed"));

        let queue = Arc::new(Mutex::new(leads.into_iter().enumerate().collect::<VecDeque<_>>()));
        let finished = Arc::new(Mutex::new(Vec::with_capacity(lead_count)));

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: queue.clone(),
                    finished: finished.clone(),
                    resources: resources.clone(),
                    aggregator: aggregator.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Worker task ended abnormally");
            }
        }
        if let Some(timer) = deadline {
            timer.abort();
        }

        // Leads never pulled (cancellation) still get a terminal status.
        let leftover: Vec<_> = queue.lock().drain(..).collect();
        for (index, mut lead) in leftover {
            if let Err(err) = lead.fail(None, Failure::new(FailureKind::Cancelled, CAMPAIGN_CANCELLED)) {
                error!(lead_id = %lead.id, error = %err, "Could not mark lead cancelled");
            }
            aggregator.record_at(index, &lead);
            finished.lock().push((index, lead));
        }
        if let Some(reason) = self.cancel.reason() {
            warn!(%run_id, %reason, "Campaign cancelled");
            aggregator.mark_cancelled(reason);
        }

        let report = aggregator.finalize();
        let mut leads = std::mem::take(&mut *finished.lock());
        leads.sort_by_key(|(index, _)| *index);
        let leads = leads.into_iter().map(|(_, lead)| lead).collect();

        info!(
            %run_id,
            leads = report.totals.leads,
            tasks_created = report.totals.tasks_created,
            failed = report.totals.failed,
            duration_ms = report.duration_ms,
            "Campaign completed"
        );
        self.sink.try_emit(
            CAMPAIGN_COMPLETED,
            Some(serde_json::json!({
                "run_id": run_id,
                "totals": report.totals,
                "cancelled": report.cancelled,
                "duration_ms": report.duration_ms,
            })),
        );

        Ok(CampaignOutcome {
            report,
            leads,
            retry_stats: resources.executor().stats(),
        })
    }

    /// Lists the lead set under the data-store policy.
    ///
    /// Listing is not bound to the campaign token: a campaign cancelled
    /// before or during listing still gets its leads, and each of them is
    /// then recorded as cancelled.
    async fn list_leads(&self, policy: &RetryPolicy) -> Result<Vec<Lead>, OutreachError> {
        let mut executor = RetryExecutor::new(self.sink.clone(), Arc::new(CancellationToken::new()));
        if let Some(timeout) = self.options.call_timeout {
            executor = executor.with_call_timeout(timeout);
        }
        let source = &self.adapters.source;
        let execution = executor
            .execute(CallSite::new("list_leads"), policy, |_| async move {
                match source.list_leads().await {
                    Ok(leads) => StageResult::Success(leads),
                    Err(err) if err.kind.is_transient() => StageResult::RetryableFailure(Failure::new(err.kind, err.message)),
                    Err(err) => StageResult::PermanentFailure(Failure::new(err.kind, err.message)),
                }
            })
            .await;

        match execution.result {
            StageResult::Success(leads) => {
                info!(count = leads.len(), "Retrieved leads");
                Ok(leads)
            }
            StageResult::RetryableFailure(failure) | StageResult::PermanentFailure(failure) => {
                error!(kind = %failure.kind, reason = %failure.reason, "Could not list leads");
                Err(SourceError::new(failure.kind, failure.reason).into())
            }
        }
    }
}

impl std::fmt::Debug for CampaignOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignOrchestrator")
            .field("options", &self.options)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

type LeadQueue = Arc<Mutex<VecDeque<(usize, Lead)>>>;

struct Worker {
    id: usize,
    queue: LeadQueue,
    finished: Arc<Mutex<Vec<(usize, Lead)>>>,
    resources: Arc<PipelineResources>,
    aggregator: Arc<MetricsAggregator>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.resources.cancel_token().is_cancelled() {
                break;
            }
            let Some((index, lead)) = self.next_lead() else {
                break;
            };

            let identity = lead.identity();
            let pipeline = LeadPipeline::new(self.resources.clone());
            let lead = match AssertUnwindSafe(pipeline.run(lead)).catch_unwind().await {
                Ok(lead) => lead,
                Err(payload) => {
                    error!(
                        worker = self.id,
                        lead_id = %identity.id,
                        panic = %panic_message(payload.as_ref()),
                        "Lead pipeline panicked"
                    );
                    let mut lead = identity;
                    if let Err(err) = lead.fail(None, Failure::new(FailureKind::Internal, INTERNAL_ERROR)) {
                        error!(lead_id = %lead.id, error = %err, "Could not mark lead failed");
                    }
                    lead
                }
            };

            self.aggregator.record_at(index, &lead);
            self.finished.lock().push((index, lead));
        }
    }

    fn next_lead(&self) -> Option<(usize, Lead)> {
        self.queue.lock().pop_front()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a campaign with default options and the given worker count.
pub async fn run_campaign(
    source: Arc<dyn LeadSource>,
    generator: Arc<dyn MessageGenerator>,
    email: Arc<dyn EmailSender>,
    tasks: Arc<dyn TaskCreator>,
    concurrency: usize,
) -> Result<CampaignReport, OutreachError> {
    let adapters = Adapters::new(source, generator, email, tasks);
    let options = CampaignOptions::default().with_concurrency(concurrency);
    let outcome = CampaignOrchestrator::new(adapters, options).run().await?;
    Ok(outcome.report)
}
