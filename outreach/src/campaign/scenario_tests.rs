//! End-to-end campaign runs over scripted adapters.

#[cfg(test)]
mod tests {
    use crate::adapters::MockLeadSource;
    use crate::campaign::{CampaignOptions, CampaignOrchestrator, INTERNAL_ERROR};
    use crate::cancellation::{CancellationToken, CAMPAIGN_CANCELLED};
    use crate::core::{AttemptOutcome, LeadStatus, Stage, StageResult};
    use crate::errors::FailureKind;
    use crate::events::{CollectingEventSink, CAMPAIGN_COMPLETED, CAMPAIGN_STARTED, LEAD_COMPLETED};
    use crate::metrics::CampaignTotals;
    use crate::pipeline::{RetryPolicies, RetryPolicy};
    use crate::testing::{lead, valid_leads, MockAdapters, ScriptedGenerator};
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_options() -> CampaignOptions {
        CampaignOptions::default().with_policies(RetryPolicies::uniform(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1)
                .with_max_delay_ms(2)
                .with_jitter(0.1),
        ))
    }

    #[tokio::test]
    async fn test_three_lead_scenario() {
        let mocks = MockAdapters::new(vec![
            lead("A", "Alice", "Acme", "alice@acme.com"),
            lead("B", "Bob", "Builders", "bad-email"),
            lead("C", "Carol", "Cargo", "carol@cargo.io"),
        ]);
        mocks.email.script.push_n(
            "carol@cargo.io",
            2,
            StageResult::retryable(FailureKind::Transport, "connection reset"),
        );

        let outcome = CampaignOrchestrator::new(mocks.adapters(), fast_options())
            .run()
            .await
            .unwrap();

        assert_eq!(
            outcome.report.totals,
            CampaignTotals {
                leads: 3,
                validated: 2,
                messages_generated: 2,
                emails_sent: 2,
                tasks_created: 2,
                failed: 1,
            }
        );

        let statuses: Vec<_> = outcome.leads.iter().map(|l| (l.id.as_str(), l.status())).collect();
        assert_eq!(
            statuses,
            vec![
                ("A", LeadStatus::TaskCreated),
                ("B", LeadStatus::Failed),
                ("C", LeadStatus::TaskCreated),
            ]
        );

        let b = &outcome.leads[1];
        assert_eq!(b.failure().unwrap().stage, Some(Stage::Validate));
        assert_eq!(mocks.generator.script.calls_for("B"), 0);

        let c = &outcome.leads[2];
        let email_attempts: Vec<_> = c.attempts_for(Stage::SendEmail).map(|a| a.outcome).collect();
        assert_eq!(
            email_attempts,
            vec![
                AttemptOutcome::RetryableFailure,
                AttemptOutcome::RetryableFailure,
                AttemptOutcome::Success,
            ]
        );

        assert_eq!(outcome.report.failed_leads.len(), 1);
        assert_eq!(outcome.report.failed_leads[0].lead_id, "B");
        assert_eq!(outcome.retry_stats.retries, 2);
        assert!(!outcome.report.cancelled);
    }

    #[tokio::test]
    async fn test_panicking_lead_is_isolated() {
        let generator = ScriptedGenerator::new();
        generator.panic_for("lead-2");
        let mocks = MockAdapters::with_generator(valid_leads(6), generator);

        let outcome = CampaignOrchestrator::new(mocks.adapters(), fast_options().with_concurrency(3))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.leads.len(), 6);
        for lead in &outcome.leads {
            if lead.id == "lead-2" {
                let failure = lead.failure().unwrap();
                assert_eq!(lead.status(), LeadStatus::Failed);
                assert_eq!(failure.kind, FailureKind::Internal);
                assert_eq!(failure.reason, INTERNAL_ERROR);
                assert_eq!(failure.stage, None);
            } else {
                assert_eq!(lead.status(), LeadStatus::TaskCreated, "{}", lead.id);
            }
        }
        assert_eq!(outcome.report.totals.tasks_created, 5);
        assert_eq!(outcome.report.totals.failed, 1);
        assert_eq!(mocks.email.sent().len(), 5);
    }

    #[tokio::test]
    async fn test_every_lead_processed_exactly_once() {
        for concurrency in [1, 4, 64] {
            let mocks = MockAdapters::new(valid_leads(25));
            let outcome = CampaignOrchestrator::new(
                mocks.adapters(),
                fast_options().with_concurrency(concurrency),
            )
            .run()
            .await
            .unwrap();

            assert_eq!(outcome.leads.len(), 25);
            let ids: HashSet<_> = outcome.leads.iter().map(|l| l.id.clone()).collect();
            assert_eq!(ids.len(), 25);
            assert_eq!(outcome.report.totals.tasks_created, 25);

            let recipients: HashSet<_> = mocks.email.sent().into_iter().map(|m| m.to).collect();
            assert_eq!(recipients.len(), 25);
            assert_eq!(mocks.email.sent().len(), 25);
            assert_eq!(mocks.tasks.created().len(), 25);
        }
    }

    #[tokio::test]
    async fn test_results_keep_source_order() {
        let mocks = MockAdapters::with_generator(
            valid_leads(10),
            ScriptedGenerator::new().with_latency(Duration::from_millis(1)),
        );
        let outcome = CampaignOrchestrator::new(mocks.adapters(), fast_options().with_concurrency(4))
            .run()
            .await
            .unwrap();

        let ids: Vec<_> = outcome.leads.iter().map(|l| l.id.clone()).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("lead-{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_deadline_cancels_remaining_leads() {
        let mocks = MockAdapters::with_generator(
            valid_leads(20),
            ScriptedGenerator::new().with_latency(Duration::from_millis(40)),
        );
        let options = fast_options()
            .with_concurrency(2)
            .with_deadline(Duration::from_millis(100));

        let outcome = CampaignOrchestrator::new(mocks.adapters(), options)
            .run()
            .await
            .unwrap();

        let report = &outcome.report;
        assert!(report.cancelled);
        assert_eq!(report.cancel_reason.as_deref(), Some("campaign deadline elapsed"));
        assert_eq!(report.totals.leads, 20);
        assert_eq!(report.totals.tasks_created + report.totals.failed, 20);
        assert!(report.totals.failed > 0);
        assert!(outcome.leads.iter().all(|l| l.status().is_terminal()));

        let cancelled = outcome
            .leads
            .iter()
            .filter(|l| l.failure().is_some_and(|f| f.reason == CAMPAIGN_CANCELLED))
            .count();
        assert_eq!(u64::try_from(cancelled).unwrap(), report.totals.failed);
        assert!(mocks.generator.script.call_count() < 20);
    }

    #[tokio::test]
    async fn test_external_cancel_before_start() {
        let mocks = MockAdapters::new(valid_leads(3));
        let cancel = Arc::new(CancellationToken::new());
        cancel.cancel("operator abort");

        let outcome = CampaignOrchestrator::new(mocks.adapters(), fast_options())
            .with_cancel_token(cancel)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.report.totals.failed, 3);
        assert_eq!(outcome.report.cancel_reason.as_deref(), Some("operator abort"));
        for lead in &outcome.leads {
            let failure = lead.failure().unwrap();
            assert_eq!(failure.kind, FailureKind::Cancelled);
            assert_eq!(failure.reason, CAMPAIGN_CANCELLED);
        }
        assert_eq!(mocks.generator.script.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_listing_records_every_lead() {
        let mocks = MockAdapters::new(Vec::new());
        let cancel = Arc::new(CancellationToken::new());
        let token = cancel.clone();
        let mut source = MockLeadSource::new();
        source.expect_test_connection().returning(|| true);
        source.expect_list_leads().times(1).returning(move || {
            token.cancel("interrupted");
            Ok(valid_leads(4))
        });
        let mut adapters = mocks.adapters();
        adapters.source = Arc::new(source);

        let outcome = CampaignOrchestrator::new(adapters, fast_options())
            .with_cancel_token(cancel)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.report.totals.leads, 4);
        assert_eq!(outcome.report.totals.failed, 4);
        assert_eq!(outcome.report.cancel_reason.as_deref(), Some("interrupted"));
        for lead in &outcome.leads {
            let failure = lead.failure().unwrap();
            assert_eq!(failure.stage, None);
            assert_eq!(failure.kind, FailureKind::Cancelled);
            assert_eq!(failure.reason, CAMPAIGN_CANCELLED);
        }
        assert_eq!(mocks.generator.script.call_count(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_lead_fails_at_next_gate_after_deadline() {
        let mocks = MockAdapters::with_generator(
            valid_leads(2),
            ScriptedGenerator::new().with_latency(Duration::from_millis(80)),
        );
        let options = fast_options()
            .with_concurrency(1)
            .with_deadline(Duration::from_millis(20));

        let outcome = CampaignOrchestrator::new(mocks.adapters(), options)
            .run()
            .await
            .unwrap();

        let in_flight = &outcome.leads[0];
        assert!(in_flight.has_completed(Stage::GenerateMessage));
        let failure = in_flight.failure().unwrap();
        assert_eq!(failure.stage, Some(Stage::SendEmail));
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.reason, CAMPAIGN_CANCELLED);

        let never_pulled = outcome.leads[1].failure().unwrap();
        assert_eq!(never_pulled.stage, None);
        assert_eq!(never_pulled.reason, CAMPAIGN_CANCELLED);

        assert!(mocks.email.sent().is_empty());
        assert_eq!(
            outcome
                .report
                .failed_leads
                .iter()
                .map(|f| f.lead_id.as_str())
                .collect::<Vec<_>>(),
            vec!["lead-0", "lead-1"]
        );
    }

    #[tokio::test]
    async fn test_auth_halt_across_workers() {
        let mocks = MockAdapters::new(valid_leads(8));
        for i in 0..8 {
            mocks.tasks.script.push(
                format!("lead-{i}"),
                StageResult::permanent(FailureKind::Auth, "401 token invalid"),
            );
        }
        let options = fast_options().with_concurrency(1).with_halt_on_auth_failure(true);

        let outcome = CampaignOrchestrator::new(mocks.adapters(), options)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.report.totals.failed, 8);
        assert_eq!(outcome.report.totals.emails_sent, 8);
        assert_eq!(mocks.tasks.script.call_count(), 1);
        assert!(outcome
            .report
            .failed_leads
            .iter()
            .all(|f| f.kind == FailureKind::Auth && f.stage == Some(Stage::CreateTask)));
    }

    #[tokio::test]
    async fn test_campaign_events() {
        let mocks = MockAdapters::new(valid_leads(3));
        let sink = Arc::new(CollectingEventSink::new());

        CampaignOrchestrator::new(mocks.adapters(), fast_options())
            .with_event_sink(sink.clone())
            .run()
            .await
            .unwrap();

        let started = sink.events_of_type(CAMPAIGN_STARTED);
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].1.as_ref().unwrap()["leads"], 3);
        assert_eq!(sink.events_of_type(LEAD_COMPLETED).len(), 3);

        let completed = sink.events_of_type(CAMPAIGN_COMPLETED);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1.as_ref().unwrap()["totals"]["tasks_created"], 3);
        assert_eq!(sink.events().last().unwrap().0, CAMPAIGN_COMPLETED);
    }
}
