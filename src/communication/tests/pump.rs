//! Tests for the pump thread's delivery order and maintenance tick

#[cfg(test)]
mod tests {
    use crate::communication::api::{Counter, MetricUpdateHook, MetricValue};
    use crate::communication::tests::{fast_config, wait_until, Harness};
    use crate::queue::{Route, StorageMessage};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_inbound_commands_reach_pipeline_in_priority_order() {
        let harness = Harness::new();
        for (id, priority) in [(1, 9), (2, 0), (3, 9), (4, 3), (5, 0)] {
            harness
                .manager
                .handle_rpc_request(Box::new(harness.rpc.make_request(id, priority, Vec::new())));
        }

        harness.manager.open().unwrap();

        let ids: Vec<u64> = (0..5).map(|_| harness.recv().id()).collect();
        assert_eq!(ids, vec![2, 5, 4, 1, 3]);
        assert_eq!(harness.manager.counter(Counter::Delivered), 5);
    }

    #[test]
    fn test_outbound_commands_leave_in_priority_order() {
        let harness = Harness::new();
        for (id, priority) in [(1, 200), (2, 10), (3, 10), (4, 0)] {
            harness
                .manager
                .on_upward(
                    StorageMessage::command(id, Vec::new())
                        .with_priority(priority)
                        .with_address(Route::new("storage/2")),
                )
                .unwrap();
        }

        harness.manager.open().unwrap();

        assert!(wait_until(|| harness.bus.sent().len() == 4));
        let ids: Vec<u64> = harness.bus.sent().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_upward_command_is_stamped_with_current_generation() {
        let harness = Harness::new();
        let current = harness.manager.protocols().current();
        assert_eq!(Arc::strong_count(&current), 2);

        let command = StorageMessage::command(1, Vec::new()).with_address(Route::new("s"));
        assert!(command.protocol().is_none());
        harness.manager.on_upward(command).unwrap();

        // Registry, this test and the queued command
        assert_eq!(Arc::strong_count(&current), 3);
    }

    #[test]
    fn test_maintenance_tick_pushes_metrics() {
        let harness = Harness::new();
        harness.manager.open().unwrap();

        harness.clock.advance_time(Duration::from_secs(11));

        assert!(wait_until(|| harness.sink.last("queue_depth").is_some()));
        assert_eq!(harness.sink.last("retired_generations"), Some(MetricValue::Gauge(0)));
    }

    #[test]
    fn test_update_metrics_reports_gauges_and_counters() {
        let harness = Harness::new();
        harness
            .manager
            .on_upward(StorageMessage::command(1, Vec::new()).with_address(Route::new("s")))
            .unwrap();

        harness.manager.update_metrics();

        assert_eq!(harness.sink.last("queue_depth"), Some(MetricValue::Gauge(1)));
        assert_eq!(harness.sink.last("pending_commands"), Some(MetricValue::Gauge(0)));
        assert_eq!(harness.sink.last("enqueued"), Some(MetricValue::Counter(1)));

        let snapshot = harness.manager.metrics_snapshot();
        assert_eq!(snapshot.queue_depth, 1);
        assert_eq!(snapshot.counter(Counter::Enqueued), 1);
    }

    #[test]
    fn test_metrics_interval_beyond_u64_millis_never_fires() {
        let mut config = fast_config();
        // 2^64 + 384 milliseconds
        config.metrics.interval_secs = 18_446_744_073_709_552;
        let harness = Harness::with_config(config);
        harness.manager.open().unwrap();

        harness.clock.advance_time(Duration::from_secs(3600));
        thread::sleep(Duration::from_millis(50));

        assert!(harness.sink.last("queue_depth").is_none());
    }
}
