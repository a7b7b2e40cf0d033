use super::*;

#[test]
fn record_increments_each_key_independently() {
    let usage = UsageRecorder::new();
    usage.record(CounterKey::Total);
    usage.record(CounterKey::Total);
    usage.record(CounterKey::Endpoint("quiz"));
    usage.record(CounterKey::Client("10.0.0.1".to_string()));

    assert_eq!(usage.count(&CounterKey::Total), 2);
    assert_eq!(usage.count(&CounterKey::Endpoint("quiz")), 1);
    assert_eq!(usage.count(&CounterKey::Endpoint("test")), 0);
    assert_eq!(usage.count(&CounterKey::Client("10.0.0.1".to_string())), 1);
}

#[test]
fn snapshot_groups_counters_by_kind() {
    let usage = UsageRecorder::new();
    usage.record(CounterKey::Total);
    usage.record(CounterKey::Endpoint("quiz"));
    usage.record(CounterKey::Endpoint("test"));
    usage.record(CounterKey::Client("a".to_string()));
    usage.record(CounterKey::Client("b".to_string()));
    usage.record(CounterKey::Client("b".to_string()));

    let snap = usage.snapshot();
    assert_eq!(snap.total, 1);
    assert_eq!(snap.by_endpoint.get("quiz"), Some(&1));
    assert_eq!(snap.by_endpoint.get("test"), Some(&1));
    assert_eq!(snap.by_client.len(), 2);
    assert_eq!(snap.by_client.get("b"), Some(&2));
}

#[test]
fn concurrent_increments_are_not_lost() {
    let usage = UsageRecorder::new();
    let threads = 16;
    let per_thread = 500;

    std::thread::scope(|s| {
        for t in 0..threads {
            let usage = &usage;
            s.spawn(move || {
                for _ in 0..per_thread {
                    usage.record(CounterKey::Total);
                    usage.record(CounterKey::Client(format!("client-{}", t % 4)));
                }
            });
        }
    });

    let snap = usage.snapshot();
    assert_eq!(snap.total, threads * per_thread);
    assert_eq!(snap.by_client.values().sum::<u64>(), threads * per_thread);
}

#[test]
fn format_uptime_splits_days_hours_minutes() {
    let uptime = Duration::from_secs(2 * 86_400 + 3 * 3600 + 14 * 60 + 59);
    assert_eq!(format_uptime(uptime), "2d 3h 14m");
    assert_eq!(format_uptime(Duration::ZERO), "0d 0h 0m");
}
