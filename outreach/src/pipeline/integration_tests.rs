//! Lead pipeline tests against scripted adapters.

#[cfg(test)]
mod tests {
    use crate::adapters::TaskPriority;
    use crate::cancellation::{CancellationToken, CAMPAIGN_CANCELLED};
    use crate::core::{AttemptOutcome, LeadStatus, Stage, StageResult};
    use crate::errors::FailureKind;
    use crate::events::{CollectingEventSink, EventSink, NoOpEventSink, LEAD_COMPLETED, STAGE_COMPLETED};
    use crate::pipeline::{
        LeadPipeline, PipelineResources, RetryPolicies, RetryPolicy, TaskSettings,
    };
    use crate::testing::{lead, MockAdapters};
    use std::sync::Arc;

    fn fast_policies() -> RetryPolicies {
        RetryPolicies::uniform(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1)
                .with_max_delay_ms(2)
                .with_jitter(0.0),
        )
    }

    fn pipeline_with(mocks: &MockAdapters, sink: Arc<dyn EventSink>, cancel: Arc<CancellationToken>) -> LeadPipeline {
        let resources = PipelineResources::new(mocks.adapters(), sink, cancel).with_policies(fast_policies());
        LeadPipeline::new(Arc::new(resources))
    }

    fn pipeline(mocks: &MockAdapters) -> LeadPipeline {
        pipeline_with(mocks, Arc::new(NoOpEventSink), Arc::new(CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_lead_runs_all_stages() {
        let mocks = MockAdapters::new(Vec::new());
        let done = pipeline(&mocks)
            .run(lead("a", "Ada", "Engines", "ada@engines.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::TaskCreated);
        assert!(done.failure().is_none());
        assert_eq!(done.attempts().len(), 4);
        assert_eq!(
            done.timings().iter().map(|t| t.stage).collect::<Vec<_>>(),
            Stage::ALL.to_vec()
        );

        let sent = mocks.email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@engines.io");
        assert_eq!(sent[0].subject, "Let's help Engines grow!");
        assert_eq!(Some(sent[0].body.as_str()), done.message());

        let created = mocks.tasks.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Follow up with Ada at Engines");
        assert_eq!(Some(created[0].description.as_str()), done.message());
    }

    #[tokio::test]
    async fn test_invalid_email_stops_at_validate() {
        let mocks = MockAdapters::new(Vec::new());
        let done = pipeline(&mocks)
            .run(lead("b", "Bob", "Builders", "bad-email"))
            .await;

        assert_eq!(done.status(), LeadStatus::Failed);
        let failure = done.failure().unwrap();
        assert_eq!(failure.stage, Some(Stage::Validate));
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(done.attempts().len(), 1);
        assert_eq!(done.attempts()[0].outcome, AttemptOutcome::PermanentFailure);
        assert_eq!(mocks.generator.script.call_count(), 0);
        assert_eq!(done.timings().len(), 1);
    }

    #[tokio::test]
    async fn test_email_succeeds_on_last_attempt() {
        let mocks = MockAdapters::new(Vec::new());
        mocks.email.script.push_n(
            "cy@corp.io",
            2,
            StageResult::retryable(FailureKind::Transport, "421 try again later"),
        );

        let done = pipeline(&mocks)
            .run(lead("c", "Cy", "Corp", "cy@corp.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::TaskCreated);
        let email_attempts: Vec<_> = done.attempts_for(Stage::SendEmail).collect();
        assert_eq!(email_attempts.len(), 3);
        assert_eq!(email_attempts[0].outcome, AttemptOutcome::RetryableFailure);
        assert_eq!(email_attempts[0].error.as_deref(), Some("421 try again later"));
        assert_eq!(email_attempts[2].outcome, AttemptOutcome::Success);
        assert_eq!(mocks.email.script.calls_for("cy@corp.io"), 3);
    }

    #[tokio::test]
    async fn test_exhausted_generation_skips_later_stages() {
        let mocks = MockAdapters::new(Vec::new());
        mocks.generator.script.push_n(
            "d",
            3,
            StageResult::retryable(FailureKind::RateLimit, "429 Too Many Requests"),
        );

        let done = pipeline(&mocks)
            .run(lead("d", "Dee", "Dynamics", "dee@dynamics.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::Failed);
        let failure = done.failure().unwrap();
        assert_eq!(failure.stage, Some(Stage::GenerateMessage));
        assert_eq!(failure.kind, FailureKind::RateLimit);
        assert_eq!(failure.reason, "429 Too Many Requests");
        assert_eq!(done.attempts_for(Stage::GenerateMessage).count(), 3);
        assert_eq!(mocks.email.script.call_count(), 0);
        assert_eq!(mocks.tasks.script.call_count(), 0);
        assert!(done.message().is_none());
    }

    #[tokio::test]
    async fn test_permanent_task_failure_keeps_progress() {
        let mocks = MockAdapters::new(Vec::new());
        mocks
            .tasks
            .script
            .push("e", StageResult::permanent(FailureKind::Validation, "400 list not found"));

        let done = pipeline(&mocks)
            .run(lead("e", "Eve", "Electric", "eve@electric.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::Failed);
        assert!(done.has_completed(Stage::SendEmail));
        assert_eq!(done.completed_stage(), Some(Stage::SendEmail));
        assert_eq!(done.failure().unwrap().stage, Some(Stage::CreateTask));
        assert_eq!(mocks.tasks.script.calls_for("e"), 1);
        assert_eq!(done.timings().len(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_campaign_fails_lead_before_next_stage() {
        let mocks = MockAdapters::new(Vec::new());
        let cancel = Arc::new(CancellationToken::new());
        cancel.cancel("shutdown");

        let done = pipeline_with(&mocks, Arc::new(NoOpEventSink), cancel)
            .run(lead("f", "Fay", "Foundry", "fay@foundry.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::Failed);
        assert!(done.has_completed(Stage::Validate));
        let failure = done.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.reason, CAMPAIGN_CANCELLED);
        assert_eq!(failure.stage, Some(Stage::GenerateMessage));
        assert_eq!(mocks.generator.script.call_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_halts_adapter_when_enabled() {
        let mocks = MockAdapters::new(Vec::new());
        mocks
            .email
            .script
            .push("g1@corp.io", StageResult::permanent(FailureKind::Auth, "401 Unauthorized"));
        let resources = PipelineResources::new(
            mocks.adapters(),
            Arc::new(NoOpEventSink),
            Arc::new(CancellationToken::new()),
        )
        .with_policies(fast_policies())
        .with_halt_on_auth_failure(true);
        let pipeline = LeadPipeline::new(Arc::new(resources));

        let first = pipeline.run(lead("g1", "Gus", "Corp", "g1@corp.io")).await;
        let second = pipeline.run(lead("g2", "Gil", "Corp", "g2@corp.io")).await;

        assert_eq!(first.failure().unwrap().kind, FailureKind::Auth);
        assert_eq!(second.status(), LeadStatus::Failed);
        assert_eq!(second.failure().unwrap().kind, FailureKind::Auth);
        assert_eq!(second.failure().unwrap().stage, Some(Stage::SendEmail));
        assert_eq!(mocks.email.script.calls_for("g2@corp.io"), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_isolated_by_default() {
        let mocks = MockAdapters::new(Vec::new());
        mocks
            .email
            .script
            .push("h1@corp.io", StageResult::permanent(FailureKind::Auth, "401 Unauthorized"));
        let pipeline = pipeline(&mocks);

        let first = pipeline.run(lead("h1", "Hal", "Corp", "h1@corp.io")).await;
        let second = pipeline.run(lead("h2", "Hop", "Corp", "h2@corp.io")).await;

        assert_eq!(first.status(), LeadStatus::Failed);
        assert_eq!(second.status(), LeadStatus::TaskCreated);
    }

    #[tokio::test]
    async fn test_task_settings_forwarded() {
        let mocks = MockAdapters::new(Vec::new());
        let resources = PipelineResources::new(
            mocks.adapters(),
            Arc::new(NoOpEventSink),
            Arc::new(CancellationToken::new()),
        )
        .with_task_settings(TaskSettings {
            priority: Some(TaskPriority::High),
            due_in_days: Some(2),
        });

        let done = LeadPipeline::new(Arc::new(resources))
            .run(lead("i", "Ivy", "Ink", "ivy@ink.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::TaskCreated);
        let created = mocks.tasks.created();
        assert_eq!(created[0].priority, Some(TaskPriority::High));
        assert!(created[0].due_date.unwrap() > chrono::Utc::now());
    }

    #[tokio::test]
    async fn test_pipeline_emits_events() {
        let mocks = MockAdapters::new(Vec::new());
        let sink = Arc::new(CollectingEventSink::new());
        let done = pipeline_with(&mocks, sink.clone(), Arc::new(CancellationToken::new()))
            .run(lead("j", "Jo", "Jets", "jo@jets.io"))
            .await;

        assert_eq!(done.status(), LeadStatus::TaskCreated);
        assert_eq!(sink.events_of_type(STAGE_COMPLETED).len(), 4);
        let completed = sink.events_of_type(LEAD_COMPLETED);
        assert_eq!(completed.len(), 1);
        let data = completed[0].1.as_ref().unwrap();
        assert_eq!(data["lead_id"], "j");
        assert_eq!(data["status"], "task_created");
    }
}
