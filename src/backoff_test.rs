use std::time::Duration;

use crate::backoff::BackoffSchedule;
use crate::options::RefreshConfig;
use crate::options::ReplicaConfig;
use crate::options::StartupConfig;

fn schedule() -> BackoffSchedule {
    BackoffSchedule::new(
        StartupConfig::default(),
        RefreshConfig::default(),
        ReplicaConfig::default(),
        Some(7),
    )
}

#[test]
fn test_startup_delay_staircase() {
    let schedule = schedule();
    assert_eq!(
        schedule.startup_delay(Duration::from_secs(0)),
        Some(Duration::from_secs(1))
    );
    assert_eq!(
        schedule.startup_delay(Duration::from_secs(15)),
        Some(Duration::from_secs(2))
    );
    assert_eq!(
        schedule.startup_delay(Duration::from_secs(45)),
        Some(Duration::from_secs(5))
    );
    assert_eq!(
        schedule.startup_delay(Duration::from_secs(75)),
        Some(Duration::from_secs(10))
    );
}

#[test]
fn test_startup_delay_ends_at_grace_window() {
    let schedule = schedule();
    assert_eq!(schedule.startup_delay(Duration::from_secs(100)), None);
    assert_eq!(schedule.startup_delay(Duration::from_secs(500)), None);
}

#[test]
fn test_refresh_delay_respects_min_and_jitter() {
    let schedule = schedule();
    for _ in 0..100 {
        let delay = schedule.refresh_delay(1);
        assert!(delay >= Duration::from_secs_f64(30.0 * 0.8), "delay {delay:?}");
        assert!(delay <= Duration::from_secs(30), "delay {delay:?}");
    }
}

#[test]
fn test_refresh_delay_clamps_at_max() {
    let schedule = schedule();
    for attempt in [10, 20, 60] {
        let delay = schedule.refresh_delay(attempt);
        assert!(delay >= Duration::from_secs_f64(600.0 * 0.8), "delay {delay:?}");
        assert!(delay <= Duration::from_secs(600), "delay {delay:?}");
    }
}

#[test]
fn test_replica_cooldown_grows_with_failures() {
    let schedule = schedule();
    let first = schedule.replica_cooldown(1);
    assert!(first >= Duration::from_secs_f64(30.0 * 0.8));
    assert!(first <= Duration::from_secs(30));

    let late = schedule.replica_cooldown(12);
    assert!(late >= Duration::from_secs_f64(600.0 * 0.8));
    assert!(late <= Duration::from_secs(600));
}

#[test]
fn test_request_delay_stays_within_policy_bounds() {
    let schedule = schedule();
    let first = schedule.request_delay(1);
    assert!(first >= Duration::from_millis(40));
    assert!(first <= Duration::from_millis(50));

    let late = schedule.request_delay(30);
    assert!(late <= Duration::from_millis(1000));
}

#[test]
fn test_push_delay_uniform_within_bound() {
    let schedule = schedule();
    for _ in 0..100 {
        let delay = schedule.push_delay(Duration::from_secs(30));
        assert!(delay <= Duration::from_secs(30));
    }
    assert_eq!(schedule.push_delay(Duration::ZERO), Duration::ZERO);
}

#[test]
fn test_seeded_schedules_are_deterministic() {
    let a = schedule();
    let b = schedule();
    let delays_a: Vec<_> = (1..6).map(|i| a.refresh_delay(i)).collect();
    let delays_b: Vec<_> = (1..6).map(|i| b.refresh_delay(i)).collect();
    assert_eq!(delays_a, delays_b);
}
