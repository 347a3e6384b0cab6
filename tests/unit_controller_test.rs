// tests/unit_controller_test.rs

#[path = "helpers/mod.rs"]
mod helpers;

use chrono::{Duration as ChronoDuration, Utc};
use helpers::{CountingConverger, NoopConverger, group, policy_change, state_with_desired};
use otter::core::controller::{
    Controller, calculate_desired, check_cooldowns, constrain_desired,
};
use otter::core::errors::OtterError;
use otter::core::model::{Adjustment, GroupKey, Policy, timestamp};
use otter::core::store::{InMemoryStore, ScalingStore};
use std::sync::Arc;
use std::time::Duration;

fn policy_percent(id: &str, percent: f64) -> Policy {
    Policy {
        adjustment: Adjustment::ChangePercent(percent),
        ..policy_change(id, 0, 0)
    }
}

fn controller_with(store: Arc<InMemoryStore>) -> (Arc<Controller>, Arc<CountingConverger>) {
    let converger = Arc::new(CountingConverger::default());
    let controller = Controller::new(store, converger.clone(), Duration::from_millis(10));
    (controller, converger)
}

// --- Desired-capacity arithmetic ---

#[test]
fn test_calculate_desired_change() {
    assert_eq!(calculate_desired(1, &Adjustment::Change(2)), 3);
    assert_eq!(calculate_desired(5, &Adjustment::Change(-3)), 2);
}

#[test]
fn test_calculate_desired_change_percent_rounds_away_from_zero() {
    // 3 * 50% = 1.5 rounds up to 2.
    assert_eq!(calculate_desired(3, &Adjustment::ChangePercent(50.0)), 5);
    // 3 * -50% = -1.5 rounds down to -2.
    assert_eq!(calculate_desired(3, &Adjustment::ChangePercent(-50.0)), 1);
    // Whole deltas are untouched.
    assert_eq!(calculate_desired(4, &Adjustment::ChangePercent(50.0)), 6);
    // Tiny positive fractions still round up.
    assert_eq!(calculate_desired(1, &Adjustment::ChangePercent(10.0)), 2);
}

#[test]
fn test_calculate_desired_absolute_capacity() {
    assert_eq!(calculate_desired(7, &Adjustment::DesiredCapacity(2)), 2);
}

#[test]
fn test_constrain_desired_clamps_to_bounds() {
    let config = group("t", "g", 2, 30, 0).config;
    // The configured max of 30 is itself capped at the hard limit of 25.
    for input in -50..=50i64 {
        let constrained = constrain_desired(input, &config);
        assert!(
            (2..=25).contains(&constrained),
            "input {input} -> {constrained}"
        );
    }
    assert_eq!(constrain_desired(-5, &config), 2);
    assert_eq!(constrain_desired(10, &config), 10);
    assert_eq!(constrain_desired(40, &config), 25);
}

#[test]
fn test_constrain_desired_unbounded_max_uses_hard_cap() {
    let mut config = group("t", "g", 0, 0, 0).config;
    config.max_entities = None;
    assert_eq!(constrain_desired(100, &config), 25);
}

// --- Cooldowns ---

#[test]
fn test_cooldown_blocks_within_window_and_clears_after() {
    let config = group("t", "g", 1, 10, 60).config;
    let policy = policy_change("p1", 2, 60);
    let now = Utc::now();

    let mut state = state_with_desired(1);
    assert!(check_cooldowns(&state, &config, &policy, "p1", now));

    state.mark_executed("p1", timestamp::to_zulu(now));
    // 30 seconds later both cooldowns are still hot.
    let later = now + ChronoDuration::seconds(30);
    assert!(!check_cooldowns(&state, &config, &policy, "p1", later));
    // After both cooldowns have elapsed, execution is allowed again.
    let much_later = now + ChronoDuration::seconds(61);
    assert!(check_cooldowns(&state, &config, &policy, "p1", much_later));
}

#[test]
fn test_group_cooldown_applies_across_policies() {
    let config = group("t", "g", 1, 10, 120).config;
    let other = policy_change("p2", 1, 0);
    let now = Utc::now();

    let mut state = state_with_desired(1);
    state.mark_executed("p1", timestamp::to_zulu(now));
    // p2 has no policy cooldown, but the group cooldown still blocks it.
    assert!(!check_cooldowns(
        &state,
        &config,
        &other,
        "p2",
        now + ChronoDuration::seconds(30)
    ));
}

// --- Policy execution through the controller ---

#[tokio::test]
async fn test_execute_policy_scales_up_by_change() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 1, 10, 0), state_with_desired(1));
    store.put_policy(&key, policy_change("p1", 2, 0));
    let (controller, converger) = controller_with(store.clone());

    let state = controller.execute_policy(&key, "p1", None).await.unwrap();
    assert_eq!(state.desired, 3);
    assert!(state.policy_touched.contains_key("p1"));
    assert!(state.group_touched.is_some());

    // The persisted state matches and convergence fired.
    let stored = store.view_state(&key).await.unwrap();
    assert_eq!(stored.desired, 3);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(converger.count(), 1);
}

#[tokio::test]
async fn test_execute_policy_rejects_within_cooldown() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 0, 10, 0), state_with_desired(0));
    store.put_policy(&key, policy_change("p1", 1, 60));
    let (controller, _) = controller_with(store.clone());

    let state = controller.execute_policy(&key, "p1", None).await.unwrap();
    assert_eq!(state.desired, 1);

    // Immediate re-execution fails the policy cooldown and leaves state alone.
    let err = controller.execute_policy(&key, "p1", None).await.unwrap_err();
    assert!(matches!(err, OtterError::CannotExecutePolicy { .. }));
    assert_eq!(store.view_state(&key).await.unwrap().desired, 1);
}

#[tokio::test]
async fn test_execute_policy_succeeds_after_cooldown_elapses() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    let mut state = state_with_desired(1);
    // Last execution far enough in the past that a 60 s cooldown is cold.
    let past = Utc::now() - ChronoDuration::seconds(61);
    state.mark_executed("p1", timestamp::to_zulu(past));
    store.put_group(group("t1", "g1", 0, 10, 60), state);
    store.put_policy(&key, policy_change("p1", 1, 60));
    let (controller, _) = controller_with(store.clone());

    let state = controller.execute_policy(&key, "p1", None).await.unwrap();
    assert_eq!(state.desired, 2);
}

#[tokio::test]
async fn test_execute_policy_change_percent_scenario() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 0, 25, 0), state_with_desired(3));
    store.put_policy(&key, policy_percent("p1", 50.0));
    let (controller, _) = controller_with(store.clone());

    let state = controller.execute_policy(&key, "p1", None).await.unwrap();
    assert_eq!(state.desired, 5);
}

#[tokio::test]
async fn test_execute_policy_version_mismatch_is_stale() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 0, 10, 0), state_with_desired(0));
    store.put_policy(&key, policy_change("p1", 1, 0));
    let (controller, _) = controller_with(store.clone());

    let err = controller
        .execute_policy(&key, "p1", Some("v0"))
        .await
        .unwrap_err();
    assert!(matches!(err, OtterError::StalePolicy(_)));
}

#[tokio::test]
async fn test_execute_policy_missing_group_and_policy() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "missing");
    let (controller, _) = controller_with(store.clone());
    let err = controller.execute_policy(&key, "p1", None).await.unwrap_err();
    assert!(matches!(err, OtterError::NoSuchScalingGroup(_)));

    store.put_group(group("t1", "g1", 0, 10, 0), state_with_desired(0));
    let key = GroupKey::new("t1", "g1");
    let err = controller.execute_policy(&key, "nope", None).await.unwrap_err();
    assert!(matches!(err, OtterError::NoSuchPolicy(_)));
}

#[tokio::test]
async fn test_paused_group_rejects_policy_execution() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 0, 10, 0), state_with_desired(0));
    store.put_policy(&key, policy_change("p1", 1, 0));
    let (controller, converger) = controller_with(store.clone());

    controller.pause(&key).await.unwrap();
    let err = controller.execute_policy(&key, "p1", None).await.unwrap_err();
    assert!(matches!(err, OtterError::CannotExecutePolicy { .. }));

    // Pause and resume themselves never fire convergence.
    controller.resume(&key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(converger.count(), 0);
    assert!(!store.view_state(&key).await.unwrap().paused);
}

#[tokio::test]
async fn test_obey_config_change_reclamps_without_cooldown() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    let mut state = state_with_desired(8);
    // A hot group cooldown must not matter for config changes.
    state.mark_executed("p1", timestamp::now());
    store.put_group(group("t1", "g1", 1, 5, 3600), state);
    let (controller, converger) = controller_with(store.clone());

    let state = controller.obey_config_change(&key).await.unwrap();
    assert_eq!(state.desired, 5);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(converger.count(), 1);
}

#[tokio::test]
async fn test_convergence_error_does_not_undo_state() {
    struct FailingConverger;
    #[async_trait::async_trait]
    impl otter::core::convergence::GroupConverger for FailingConverger {
        async fn converge(
            &self,
            _group: &otter::core::model::ScalingGroup,
            _state: &otter::core::model::GroupState,
        ) -> Result<otter::core::convergence::ConvergenceOutcome, OtterError> {
            Err(OtterError::Transport("cloud is down".to_string()))
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 0, 10, 0), state_with_desired(0));
    store.put_policy(&key, policy_change("p1", 3, 0));
    let controller = Controller::new(
        store.clone(),
        Arc::new(FailingConverger),
        Duration::from_millis(10),
    );

    let state = controller.execute_policy(&key, "p1", None).await.unwrap();
    assert_eq!(state.desired, 3);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Desired survives the failed pass; the next sweep re-converges.
    assert_eq!(store.view_state(&key).await.unwrap().desired, 3);
}

#[tokio::test]
async fn test_noop_converger_runs_for_scale_events() {
    let store = Arc::new(InMemoryStore::new());
    let key = GroupKey::new("t1", "g1");
    store.put_group(group("t1", "g1", 0, 10, 0), state_with_desired(0));
    store.put_policy(&key, policy_change("p1", 1, 0));
    let converger = Arc::new(NoopConverger);
    let controller = Controller::new(store, converger, Duration::from_millis(10));
    controller.execute_policy(&key, "p1", None).await.unwrap();
}
