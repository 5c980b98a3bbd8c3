//! Tests for the scheduler module.

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use cron::Schedule;
    use herald_core::config::SchedulerConfig;
    use herald_core::{NotificationContext, RuleRecord};

    use crate::cache::RuleInstanceCache;
    use crate::error::{RuleError, Stage};
    use crate::inspect::extract_entry_point;
    use crate::ports::RuleStore;
    use crate::scheduler::cron::{is_cron_due, normalize_cron};
    use crate::scheduler::{validate_schedule, RuleExecutionScheduler};
    use crate::store::MemoryRuleStore;
    use crate::testing::{CountingFactory, RecordingSink, StaticSource};

    struct Harness {
        store: Arc<MemoryRuleStore>,
        cache: Arc<RuleInstanceCache>,
        factory: Arc<CountingFactory>,
        source: Arc<StaticSource>,
        sink: Arc<RecordingSink>,
        scheduler: Arc<RuleExecutionScheduler>,
    }

    fn every_tick() -> SchedulerConfig {
        SchedulerConfig {
            honor_rule_schedules: false,
            ..SchedulerConfig::default()
        }
    }

    fn harness_with(config: SchedulerConfig, sink: RecordingSink) -> Harness {
        harness_from(config, sink, CountingFactory::default())
    }

    fn harness_from(config: SchedulerConfig, sink: RecordingSink, factory: CountingFactory) -> Harness {
        let store = Arc::new(MemoryRuleStore::new());
        let factory = Arc::new(factory);
        let cache = Arc::new(RuleInstanceCache::new(factory.clone()));
        let source = Arc::new(StaticSource::new(
            NotificationContext::builder()
                .weather("temperature", -5.0)
                .build(),
        ));
        let sink = Arc::new(sink);
        let scheduler = Arc::new(RuleExecutionScheduler::new(
            config,
            store.clone(),
            cache.clone(),
            source.clone(),
            sink.clone(),
        ));
        Harness {
            store,
            cache,
            factory,
            source,
            sink,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with(every_tick(), RecordingSink::default())
    }

    async fn add_rule(store: &MemoryRuleStore, owner: &str, source: &str) -> RuleRecord {
        let entry = extract_entry_point(source).unwrap();
        let record = RuleRecord::new(owner, "request", source, entry, None);
        store.save(&record).await.unwrap();
        record
    }

    async fn reload(store: &MemoryRuleStore, record: &RuleRecord) -> RuleRecord {
        store.find_by_id(record.id).await.unwrap().unwrap()
    }

    // -- normalize_cron ----------------------------------------------------

    #[test]
    fn normalize_cron_5_to_6_fields() {
        assert_eq!(normalize_cron("*/15 * * * *"), "0 */15 * * * *");
        assert_eq!(normalize_cron("0 6 * * 1-5"), "0 0 6 * * 1-5");
    }

    #[test]
    fn normalize_cron_passes_6_fields_and_trims() {
        assert_eq!(normalize_cron("0 */10 * * * *"), "0 */10 * * * *");
        assert_eq!(normalize_cron("  */5 * * * *  "), "0 */5 * * * *");
    }

    #[test]
    fn normalize_cron_accepts_quartz_question_mark() {
        assert_eq!(normalize_cron("0 0 12 ? * MON"), "0 0 12 * * MON");
        assert!(validate_schedule("0 0 12 ? * MON").is_ok());
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        let err = validate_schedule("every tuesday").unwrap_err();
        assert!(matches!(err, RuleError::InvalidSchedule { .. }));
        assert_eq!(err.stage(), Stage::Inspect);
    }

    // -- is_cron_due -------------------------------------------------------

    #[test]
    fn is_cron_due_never_run_before() {
        let schedule = Schedule::from_str("0 * * * * *").unwrap();
        assert!(is_cron_due(&schedule, Utc::now(), None));
    }

    #[test]
    fn is_cron_due_respects_last_run() {
        let schedule = Schedule::from_str("0 */10 * * * *").unwrap();
        let just_after_tick = chrono::DateTime::parse_from_rfc3339("2026-01-15T10:00:01Z")
            .unwrap()
            .with_timezone(&Utc);

        let later = just_after_tick + chrono::Duration::minutes(5);
        assert!(!is_cron_due(&schedule, later, Some(just_after_tick)));

        let much_later = just_after_tick + chrono::Duration::minutes(10);
        assert!(is_cron_due(&schedule, much_later, Some(just_after_tick)));
    }

    // -- ticks -------------------------------------------------------------

    #[tokio::test]
    async fn holding_rule_notifies_owner_and_counts() {
        let h = harness();
        let record = add_rule(&h.store, "alice", "pub struct Cold;").await;

        let report = h.scheduler.run_tick().await;

        assert!(!report.is_aborted());
        assert_eq!(report.active, 1);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(
            h.sink.messages(),
            vec![("alice".to_string(), "Cold fired".to_string())]
        );

        let stored = reload(&h.store, &record).await;
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.notification_count, 1);
        assert!(stored.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn false_condition_counts_execution_only() {
        let h = harness();
        let record = add_rule(&h.store, "alice", "pub struct Quiet; // never").await;

        let report = h.scheduler.run_tick().await;

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.notified, 0);
        assert!(h.sink.messages().is_empty());
        let stored = reload(&h.store, &record).await;
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.notification_count, 0);
    }

    #[tokio::test]
    async fn faulting_rules_do_not_affect_others() {
        let h = harness();
        let good = add_rule(&h.store, "alice", "pub struct Good;").await;
        let bad = add_rule(&h.store, "bob", "pub struct Bad; // evaluate_faults").await;
        let mute = add_rule(&h.store, "carol", "pub struct Mute; // describe_faults").await;
        let broken = add_rule(&h.store, "dave", "pub struct Broken; // broken").await;

        let report = h.scheduler.run_tick().await;

        assert_eq!(report.active, 4);
        assert_eq!(report.evaluated, 3);
        assert_eq!(report.notified, 1);
        assert_eq!(report.faults.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].rule_id, broken.id);
        assert_eq!(report.failures[0].stage, Stage::Compile);
        assert_eq!(
            h.sink.messages(),
            vec![("alice".to_string(), "Good fired".to_string())]
        );

        let good = reload(&h.store, &good).await;
        assert_eq!((good.execution_count, good.notification_count), (1, 1));
        let bad = reload(&h.store, &bad).await;
        assert_eq!((bad.execution_count, bad.notification_count), (1, 0));
        let mute = reload(&h.store, &mute).await;
        assert_eq!((mute.execution_count, mute.notification_count), (1, 0));
        let broken = reload(&h.store, &broken).await;
        assert_eq!((broken.execution_count, broken.notification_count), (0, 0));
        assert!(broken.last_executed_at.is_none());
    }

    #[tokio::test]
    async fn fetch_failure_aborts_tick_without_mutation() {
        let h = harness();
        let record = add_rule(&h.store, "alice", "pub struct Cold;").await;
        h.source.set_failing(true);

        let report = h.scheduler.run_tick().await;

        assert!(report.is_aborted());
        assert_eq!(report.evaluated, 0);
        assert_eq!(h.factory.builds.load(Ordering::SeqCst), 0);
        assert!(h.sink.messages().is_empty());
        assert_eq!(reload(&h.store, &record).await, record);

        h.source.set_failing(false);
        let report = h.scheduler.run_tick().await;
        assert_eq!(report.evaluated, 1);
        assert_eq!(h.source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispatch_failure_keeps_notification_count() {
        let h = harness_with(every_tick(), RecordingSink::failing());
        let record = add_rule(&h.store, "alice", "pub struct Cold;").await;

        let report = h.scheduler.run_tick().await;

        assert_eq!(report.notified, 1);
        assert_eq!(report.dispatch_failures, 1);
        assert_eq!(reload(&h.store, &record).await.notification_count, 1);
    }

    #[tokio::test]
    async fn deactivated_rule_is_excluded_from_next_tick() {
        let h = harness();
        let a = add_rule(&h.store, "alice", "pub struct A;").await;
        let b = add_rule(&h.store, "bob", "pub struct B;").await;

        let first = h.scheduler.run_tick().await;
        assert_eq!(first.evaluated, 2);
        assert!(h.cache.contains(a.id));

        h.store
            .modify(a.id, Box::new(|r| {
                r.deactivate();
            }))
            .await
            .unwrap();
        h.cache.invalidate(a.id);

        let second = h.scheduler.run_tick().await;
        assert_eq!(second.active, 1);
        assert_eq!(second.evaluated, 1);
        assert!(!h.cache.contains(a.id));
        assert_eq!(reload(&h.store, &a).await.execution_count, 1);
        assert_eq!(reload(&h.store, &b).await.execution_count, 2);
    }

    #[tokio::test]
    async fn instances_are_reused_across_ticks() {
        let h = harness();
        add_rule(&h.store, "alice", "pub struct Cold;").await;

        h.scheduler.run_tick().await;
        h.scheduler.run_tick().await;
        h.scheduler.run_tick().await;

        assert_eq!(h.factory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(h.sink.messages().len(), 3);
    }

    #[tokio::test]
    async fn rule_schedules_decide_which_rules_run() {
        let h = harness_with(SchedulerConfig::default(), RecordingSink::default());
        let fresh = add_rule(&h.store, "alice", "pub struct Fresh;").await;

        let mut yearly = RuleRecord::new("bob", "r", "pub struct Yearly;", "Yearly", Some("0 0 0 1 1 *".into()));
        yearly.last_executed_at = Some(Utc::now() - chrono::Duration::minutes(1));
        h.store.save(&yearly).await.unwrap();

        let mut invalid = RuleRecord::new("carol", "r", "pub struct Invalid;", "Invalid", None);
        invalid.schedule = "whenever".into();
        h.store.save(&invalid).await.unwrap();

        let report = h.scheduler.run_tick().await;

        assert_eq!(report.active, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.evaluated, 1);
        assert_eq!(reload(&h.store, &fresh).await.execution_count, 1);
        assert_eq!(reload(&h.store, &yearly).await.execution_count, 0);

        // Default schedule fires every ten minutes; an immediate second tick
        // finds nothing due.
        let report = h.scheduler.run_tick().await;
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.skipped, 3);
    }

    #[tokio::test]
    async fn bounded_fan_out_still_runs_everything() {
        let config = SchedulerConfig {
            max_concurrency: 1,
            ..every_tick()
        };
        let h = harness_with(config, RecordingSink::default());
        for name in ["R1", "R2", "R3", "R4", "R5"] {
            add_rule(&h.store, "alice", &format!("pub struct {name};")).await;
        }

        let report = h.scheduler.run_tick().await;
        assert_eq!(report.evaluated, 5);
        assert_eq!(report.notified, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_evaluation_holds_the_rule_until_it_returns() {
        let config = SchedulerConfig {
            eval_timeout_secs: 1,
            ..every_tick()
        };
        let h = harness_with(config, RecordingSink::default());
        let record = add_rule(&h.store, "alice", "pub struct Sleepy; // sleepy").await;

        let first = h.scheduler.run_tick().await;
        assert_eq!(first.evaluated, 1);
        assert_eq!(first.faults.len(), 1);
        assert_eq!(first.faults[0].stage, Stage::Evaluate);
        assert_eq!(first.busy, 0);

        // The timed-out call is still sleeping inside the instance.
        let second = h.scheduler.run_tick().await;
        assert_eq!(second.busy, 1);
        assert_eq!(second.evaluated, 0);
        assert!(second.faults.is_empty());
        assert_eq!(reload(&h.store, &record).await.execution_count, 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let third = h.scheduler.run_tick().await;
        assert_eq!(third.busy, 0);
        assert_eq!(third.evaluated, 1);

        assert_eq!(h.factory.concurrency.peak.load(Ordering::SeqCst), 1);
        assert_eq!(h.factory.builds.load(Ordering::SeqCst), 1);
        assert!(h.sink.messages().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rules_deleted_mid_tick_are_not_left_cached() {
        let config = SchedulerConfig {
            max_concurrency: 1,
            ..every_tick()
        };
        let h = harness_from(
            config,
            RecordingSink::default(),
            CountingFactory::slow(Duration::from_millis(400)),
        );
        let a = add_rule(&h.store, "alice", "pub struct A;").await;
        let b = add_rule(&h.store, "bob", "pub struct B;").await;

        let scheduler = Arc::clone(&h.scheduler);
        let tick = tokio::spawn(async move { scheduler.run_tick().await });

        // The first listed rule is still compiling; the second has not
        // started resolving yet.
        tokio::time::sleep(Duration::from_millis(150)).await;
        for record in [&a, &b] {
            assert!(h.store.delete(record.id).await.unwrap());
            h.cache.invalidate(record.id);
        }

        let report = tick.await.unwrap();
        assert_eq!(report.active, 2);
        assert!(!h.cache.contains(a.id));
        assert!(!h.cache.contains(b.id));
        assert!(h.cache.is_empty());
        assert!(h.store.find_by_id(a.id).await.unwrap().is_none());
        assert!(h.store.find_by_id(b.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rules_deactivated_mid_tick_are_not_left_cached() {
        let config = SchedulerConfig {
            max_concurrency: 1,
            ..every_tick()
        };
        let h = harness_from(
            config,
            RecordingSink::default(),
            CountingFactory::slow(Duration::from_millis(400)),
        );
        let a = add_rule(&h.store, "alice", "pub struct A;").await;
        let b = add_rule(&h.store, "bob", "pub struct B;").await;

        let scheduler = Arc::clone(&h.scheduler);
        let tick = tokio::spawn(async move { scheduler.run_tick().await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        for record in [&a, &b] {
            h.store
                .modify(record.id, Box::new(|r| {
                    r.deactivate();
                }))
                .await
                .unwrap();
            h.cache.invalidate(record.id);
        }

        tick.await.unwrap();
        assert!(h.cache.is_empty());
        assert!(!reload(&h.store, &a).await.active);
        assert!(!reload(&h.store, &b).await.active);

        let next = h.scheduler.run_tick().await;
        assert_eq!(next.active, 0);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn run_loop_ticks_until_shutdown() {
        let config = SchedulerConfig {
            tick_secs: 1,
            ..every_tick()
        };
        let h = harness_with(config, RecordingSink::default());
        add_rule(&h.store, "alice", "pub struct Cold;").await;

        let scheduler = Arc::clone(&h.scheduler);
        let running = tokio::spawn(async move { scheduler.run().await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        h.scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(h.source.fetches.load(Ordering::SeqCst) >= 1);
        assert!(!h.sink.messages().is_empty());
    }
}
