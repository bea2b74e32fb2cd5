//! Tests for live reconfiguration and protocol generation retention

#[cfg(test)]
mod tests {
    use crate::communication::api::{
        CommunicationConfig, ConfigOutcome, ConfigSubscriber, ConfigUpdate, Counter,
    };
    use crate::communication::tests::{fast_config, wait_until, Harness};
    use crate::queue::{ReturnCode, Route, StorageMessage};
    use crate::transport::api::{BusLimits, BusMessage, BusReply, FramedProtocol, Protocol, ProtocolFamily};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn config_with_version(version: u32) -> CommunicationConfig {
        let mut config = fast_config();
        config.mbus.protocol_version = version;
        config.generations.grace_period_secs = 60;
        config
    }

    #[test]
    fn test_in_flight_command_keeps_its_generation_across_reconfiguration() {
        let harness = Harness::with_config(config_with_version(1));

        // Stamped with generation 1 while still queued
        harness
            .manager
            .on_upward(
                StorageMessage::command(1, b"v1 payload".to_vec())
                    .with_address(Route::new("storage/4")),
            )
            .unwrap();

        let outcome = harness
            .manager
            .apply_config(ConfigUpdate::new(1, config_with_version(2)));
        assert_eq!(outcome, ConfigOutcome::Applied);
        assert_eq!(harness.manager.protocols().current().version(), 2);
        assert_eq!(harness.manager.protocols().retired_generations(), vec![1]);

        harness.manager.open().unwrap();
        assert!(wait_until(|| harness.bus.sent().len() == 1));
        let sent = harness.bus.sent()[0].clone();
        assert_eq!(sent.version, 1);
        assert_eq!(&sent.payload[..4], &[0, 0, 0, 1]);

        // Still referenced by the pending command: survives the grace period
        harness.clock.advance_time(Duration::from_secs(120));
        harness.manager.reap_generations();
        assert_eq!(harness.manager.protocols().retired_count(), 1);

        harness.bus.deliver_reply(BusReply {
            family: ProtocolFamily::Storage,
            id: 1,
            route: Route::new("storage/4"),
            version: 1,
            payload: sent.payload.clone(),
            result: ReturnCode::Ok,
        });
        let reply = harness.recv();
        assert_eq!(reply.payload(), b"v1 payload");
        assert_eq!(reply.protocol().map(|p| p.generation()), Some(1));
        drop(reply);

        harness.manager.reap_generations();
        assert!(wait_until(
            || harness.manager.protocols().retired_count() == 0
        ));
    }

    #[test]
    fn test_new_commands_use_new_generation() {
        let harness = Harness::with_config(config_with_version(1));
        harness.manager.open().unwrap();

        harness
            .manager
            .apply_config(ConfigUpdate::new(1, config_with_version(3)));
        harness
            .manager
            .on_upward(StorageMessage::command(2, Vec::new()).with_address(Route::new("s")))
            .unwrap();

        assert!(wait_until(|| harness.bus.sent().len() == 1));
        assert_eq!(harness.bus.sent()[0].version, 3);
    }

    #[test]
    fn test_inbound_traffic_on_retired_version_is_still_accepted() {
        let harness = Harness::with_config(config_with_version(1));
        harness.manager.open().unwrap();
        harness
            .manager
            .apply_config(ConfigUpdate::new(1, config_with_version(2)));

        harness.bus.deliver_message(BusMessage {
            family: ProtocolFamily::Storage,
            id: 50,
            priority: 1,
            route: Route::new("storage/9"),
            version: 1,
            payload: FramedProtocol::new(1).encode(b"old").unwrap(),
        });

        let command = harness.recv();
        assert_eq!(command.payload(), b"old");
        assert_eq!(command.protocol().map(|p| p.version()), Some(1));
    }

    #[test]
    fn test_stale_generations_are_ignored() {
        let harness = Harness::new();
        let mut config = fast_config();
        config.mbus.max_pending_count = 7;

        assert_eq!(
            harness.manager.apply_config(ConfigUpdate::new(2, config.clone())),
            ConfigOutcome::Applied
        );
        config.mbus.max_pending_count = 8;
        assert_eq!(
            harness.manager.apply_config(ConfigUpdate::new(2, config.clone())),
            ConfigOutcome::Stale
        );
        assert_eq!(
            harness.manager.apply_config(ConfigUpdate::new(1, config)),
            ConfigOutcome::Stale
        );

        let applied = harness.manager.applied_config();
        assert_eq!(applied.generation, 2);
        assert_eq!(applied.config.mbus.max_pending_count, 7);
    }

    #[test]
    fn test_invalid_configuration_keeps_previous() {
        let harness = Harness::new();
        harness.manager.open().unwrap();
        let mut config = fast_config();
        config.mbus.max_pending_count = 0;

        harness.manager.configure(ConfigUpdate::new(1, config));

        assert_eq!(harness.manager.counter(Counter::ConfigRejected), 1);
        assert_eq!(harness.manager.applied_config().generation, 0);
        assert_eq!(
            harness.manager.applied_config().config.mbus.max_pending_count,
            1024
        );
        assert!(!harness.manager.is_closed());
    }

    #[test]
    fn test_unbuildable_protocol_version_is_rejected() {
        let harness = Harness::new();

        let outcome = harness
            .manager
            .apply_config(ConfigUpdate::new(1, config_with_version(9)));

        assert_eq!(outcome, ConfigOutcome::Rejected);
        assert_eq!(harness.manager.protocols().current().version(), 1);
        assert_eq!(harness.manager.protocols().retired_count(), 0);
    }

    #[test]
    fn test_limits_are_pushed_to_bus() {
        let harness = Harness::new();
        let mut config = fast_config();
        config.mbus.max_pending_count = 16;
        config.mbus.max_pending_size = 4096;

        harness.manager.apply_config(ConfigUpdate::new(1, config));

        assert_eq!(
            harness.bus.limits(),
            Some(BusLimits {
                max_pending_count: 16,
                max_pending_size: 4096
            })
        );
    }

    #[test]
    fn test_restart_only_settings_are_not_applied() {
        let harness = Harness::new();
        let mut config = fast_config();
        config.mbus.port = 1;
        config.rpc.port = 2;
        config.queue.reply_priority = 50;
        config.queue.poll_interval_ms = 20;

        assert_eq!(
            harness.manager.apply_config(ConfigUpdate::new(1, config)),
            ConfigOutcome::Applied
        );

        let applied = harness.manager.applied_config().config;
        assert_eq!(applied.mbus.port, 19100);
        assert_eq!(applied.rpc.port, 19101);
        assert_eq!(applied.queue.reply_priority, 1);
        assert_eq!(applied.queue.poll_interval_ms, 20);
    }

    #[test]
    fn test_reconfiguration_under_load_loses_no_messages() {
        let harness = Harness::with_config(config_with_version(1));
        harness.manager.open().unwrap();
        let total = 300u64;

        let manager = Arc::clone(&harness.manager);
        let producer = thread::spawn(move || {
            for id in 0..total {
                let command = StorageMessage::command(id, id.to_be_bytes().to_vec())
                    .with_priority((id % 5) as u8)
                    .with_address(Route::new("storage/0"));
                manager.on_upward(command).unwrap();
            }
        });
        for generation in 1..=20u64 {
            let version = if generation % 2 == 0 { 1 } else { 2 };
            harness
                .manager
                .apply_config(ConfigUpdate::new(generation, config_with_version(version)));
        }
        producer.join().unwrap();

        assert!(wait_until(|| harness.bus.sent().len() as u64 == total));
        let ids: HashSet<u64> = harness.bus.sent().iter().map(|m| m.id).collect();
        assert_eq!(ids.len() as u64, total);
        for sent in harness.bus.sent() {
            let header = u32::from_be_bytes([
                sent.payload[0],
                sent.payload[1],
                sent.payload[2],
                sent.payload[3],
            ]);
            assert_eq!(header, sent.version);
        }
    }
}
