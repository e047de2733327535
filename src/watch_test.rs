use std::time::Duration;

use tokio::time::Instant;

use crate::watch::key_matches;
use crate::watch::watcher_covers;
use crate::watch::KeyWatcher;
use crate::watch::PrefixWatcher;
use crate::watch::WatcherSet;

const DEFAULT_POLL: Duration = Duration::from_secs(30);

fn set_with(keys: Vec<KeyWatcher>, prefixes: Vec<PrefixWatcher>, now: Instant) -> WatcherSet {
    WatcherSet::new(keys, prefixes, DEFAULT_POLL, now)
}

#[test]
fn test_key_matches_exact_and_prefix_glob() {
    assert!(key_matches("app:timeout", "app:timeout"));
    assert!(!key_matches("app:timeout", "app:timeouts"));
    assert!(key_matches("app:*", "app:timeout"));
    assert!(key_matches("*", "anything"));
    assert!(!key_matches("app:*", "web:timeout"));
}

#[test]
fn test_watcher_covers_normalizes_labels() {
    assert!(watcher_covers("app:*", None, "app:a", Some("")));
    assert!(watcher_covers("app:*", Some(""), "app:a", None));
    assert!(!watcher_covers("app:*", Some("prod"), "app:a", None));
}

#[tokio::test(start_paused = true)]
async fn test_watchers_start_due_and_bump_onto_cadence() {
    let now = Instant::now();
    let set = set_with(
        vec![KeyWatcher::new("a", None, Duration::from_secs(30))],
        vec![PrefixWatcher::new("app:*", None, Duration::from_secs(60))],
        now,
    );

    let (keys, prefixes) = set.expired(now);
    assert_eq!(keys, vec![0]);
    assert_eq!(prefixes, vec![0]);

    set.bump_all(now);
    let (keys, prefixes) = set.expired(now);
    assert!(keys.is_empty());
    assert!(prefixes.is_empty());

    // The key watcher comes due first; the prefix watcher later.
    let (keys, prefixes) = set.expired(now + Duration::from_secs(31));
    assert_eq!(keys, vec![0]);
    assert!(prefixes.is_empty());
    let (keys, prefixes) = set.expired(now + Duration::from_secs(61));
    assert_eq!(keys, vec![0]);
    assert_eq!(prefixes, vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_mark_all_due_accelerates_every_watcher() {
    let now = Instant::now();
    let set = set_with(
        vec![KeyWatcher::new("a", None, Duration::from_secs(300))],
        vec![PrefixWatcher::new("app:*", None, Duration::from_secs(300))],
        now,
    );
    set.bump_all(now);

    let accelerated = now + Duration::from_secs(5);
    set.mark_all_due(accelerated);
    let (keys, prefixes) = set.expired(accelerated);
    assert_eq!(keys, vec![0]);
    assert_eq!(prefixes, vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_next_due_is_monotonic_across_bumps() {
    let now = Instant::now();
    let set = set_with(
        vec![KeyWatcher::new("a", None, Duration::from_secs(30))],
        vec![],
        now,
    );

    set.bump_all(now);
    let first = set.next_due_key(0);
    tokio::time::advance(Duration::from_secs(31)).await;
    set.bump_keys(&[0], Instant::now());
    let second = set.next_due_key(0);
    assert!(second > first);
}

#[tokio::test(start_paused = true)]
async fn test_selective_bump_leaves_other_watchers_due() {
    let now = Instant::now();
    let set = set_with(
        vec![
            KeyWatcher::new("a", None, Duration::from_secs(30)),
            KeyWatcher::new("b", None, Duration::from_secs(30)),
        ],
        vec![],
        now,
    );

    set.bump_keys(&[0], now);
    let (keys, _) = set.expired(now);
    assert_eq!(keys, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_min_poll_interval_defaults_when_empty() {
    let now = Instant::now();
    let empty = set_with(vec![], vec![], now);
    assert_eq!(empty.min_poll_interval(), DEFAULT_POLL);

    let set = set_with(
        vec![KeyWatcher::new("a", None, Duration::from_secs(120))],
        vec![PrefixWatcher::new("app:*", None, Duration::from_secs(45))],
        now,
    );
    assert_eq!(set.min_poll_interval(), Duration::from_secs(45));
}
