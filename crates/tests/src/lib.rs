//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置文件往返
//! - 分发 / 重连行为性质测试
//! - 端到端场景（真实 TCP 监听 + 文件输出）

#[cfg(test)]
mod contract_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ChannelKind, ConnectionConfig, DropPolicy, SinkMode};

    const NETWORK_TOML: &str = r#"
[collection]
mode = "network"
queue_capacity = 64
drop_policy = "drop_newest"

[network]
host = "192.168.4.20"
port = 5000
max_retries = 3
backoff_base_ms = 500

[producer]
kind = "acceleration_gyro"
rate_hz = 100.0
"#;

    #[test]
    fn test_config_toml_round_trip() {
        let config = ConfigLoader::load_from_str(NETWORK_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.collection.mode, SinkMode::Network);
        assert_eq!(config.collection.drop_policy, DropPolicy::DropNewest);
        assert_eq!(config.producer.kind, ChannelKind::AccelerationGyro);
        // Unset fields fall back to defaults
        assert_eq!(config.network.backoff_factor, 2.0);

        let rendered = ConfigLoader::to_toml(&config).unwrap();
        let reloaded = ConfigLoader::load_from_str(&rendered, ConfigFormat::Toml).unwrap();
        assert_eq!(reloaded.network.host, "192.168.4.20");
        assert_eq!(reloaded.network.max_retries, 3);
        assert_eq!(reloaded.collection.queue_capacity, 64);
        assert_eq!(
            reloaded.network.to_connection_config().backoff_base,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_config_json_matches_toml() {
        let from_toml = ConfigLoader::load_from_str(NETWORK_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&from_toml).unwrap();
        let from_json = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(from_json.network.port, from_toml.network.port);
        assert_eq!(from_json.producer.rate_hz, from_toml.producer.rate_hz);
        assert_eq!(from_json.file.path, from_toml.file.path);
    }

    #[test]
    fn test_backoff_doubles_and_is_monotone() {
        for base_ms in [1u64, 250, 1000] {
            let config = ConnectionConfig {
                backoff_base: Duration::from_millis(base_ms),
                ..ConnectionConfig::default()
            };
            let mut previous = Duration::ZERO;
            for attempt in 1..=6u32 {
                let delay = config.backoff_delay(attempt);
                assert_eq!(delay, Duration::from_millis(base_ms << (attempt - 1)));
                assert!(delay >= previous);
                previous = delay;
            }
        }
    }
}

#[cfg(test)]
mod property_tests {
    use std::time::Duration;

    use contracts::{ConnectionConfig, ConnectionState, DropPolicy, Sample};
    use dispatcher::connection::mock::{ConnectStep, ScriptedConnector};
    use dispatcher::{
        ConnectionManager, DispatcherConfig, FileSink, FileSinkConfig, NetworkSink,
        SampleDispatcher, SampleQueue,
    };
    use tempfile::tempdir;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    fn fast_config(max_retries: u32, backoff_base: Duration) -> ConnectionConfig {
        ConnectionConfig {
            max_retries,
            backoff_base,
            ..ConnectionConfig::new("scripted", 5000)
        }
    }

    async fn wait_for(events: &mut broadcast::Receiver<ConnectionState>, target: ConnectionState) {
        loop {
            match events.recv().await {
                Ok(state) if state == target => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    }

    /// Written order equals submit order when the sink never fails
    #[tokio::test]
    async fn test_fifo_with_reliable_sink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fifo.txt");
        let sink = FileSink::new(
            "file",
            FileSinkConfig {
                path: path.clone(),
                precision: 0,
            },
        );
        let mut dispatcher = SampleDispatcher::new(
            sink,
            DispatcherConfig {
                queue_capacity: 1024,
                drop_policy: DropPolicy::DropOldest,
            },
        );
        dispatcher.start().await.unwrap();
        for i in 0..500 {
            dispatcher
                .submit(Sample::acceleration(0.0, f64::from(i), 0.0, 0.0))
                .unwrap();
        }
        dispatcher.stop().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let expected: Vec<String> = (0..500)
            .map(|i| format!("Acc: X={i}, Y=0, Z=0"))
            .collect();
        assert_eq!(content.lines().collect::<Vec<_>>(), expected);
        assert_eq!(dispatcher.metrics().write_count, 500);
    }

    /// A file sink on a full device fails every sample instead of reporting success
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_full_device_counts_every_failure() {
        let sink = FileSink::new(
            "file",
            FileSinkConfig {
                path: "/dev/full".into(),
                precision: 2,
            },
        );
        let mut dispatcher = SampleDispatcher::new(sink, DispatcherConfig::default());
        dispatcher.start().await.unwrap();
        for i in 0..10 {
            dispatcher
                .submit(Sample::acceleration(f64::from(i), 1.0, 2.0, 3.0))
                .unwrap();
        }
        dispatcher.stop().await.unwrap();

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.write_count, 0);
        assert_eq!(metrics.failure_count, 10);
        assert_eq!(metrics.dropped_count, 0);
    }

    /// Under drop-oldest the queue keeps the newest `Q` samples
    #[test]
    fn test_drop_oldest_keeps_newest() {
        for capacity in [1usize, 3, 16] {
            let queue = SampleQueue::new(capacity);
            queue.reopen();
            let total = capacity * 3 + 1;
            for i in 0..total {
                queue.push(Sample::acceleration(i as f64, 0.0, 0.0, 0.0), DropPolicy::DropOldest);
            }
            let mut kept = Vec::new();
            while let Some(sample) = queue.pop() {
                kept.push(sample.timestamp() as usize);
            }
            assert_eq!(kept, ((total - capacity)..total).collect::<Vec<_>>());
        }
    }

    /// `Failed` after `max_retries + 1` attempts; nothing more until `reset`
    #[tokio::test(start_paused = true)]
    async fn test_failed_after_retry_ceiling() {
        let connector = ScriptedConnector::new(ConnectStep::Refuse);
        let manager = ConnectionManager::with_connector(
            fast_config(3, Duration::from_millis(100)),
            connector.clone(),
        );
        let mut events = manager.subscribe();

        manager.connect();
        wait_for(&mut events, ConnectionState::Failed).await;
        assert_eq!(connector.attempts(), 4);

        tokio::time::sleep(Duration::from_secs(600)).await;
        manager.connect();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempts(), 4);
        assert_eq!(manager.current_state(), ConnectionState::Failed);

        manager.reset().await;
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
        assert_eq!(manager.attempt(), 0);

        manager.connect();
        wait_for(&mut events, ConnectionState::Failed).await;
        assert_eq!(connector.attempts(), 8);
    }

    /// State sequence and waits for two failed attempts with a ceiling of 2
    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_with_ceiling_two() {
        let connector = ScriptedConnector::new(ConnectStep::Refuse);
        let manager = ConnectionManager::with_connector(
            fast_config(2, Duration::from_secs(1)),
            connector.clone(),
        );
        let mut events = manager.subscribe();

        manager.connect();
        let mut seen = Vec::new();
        loop {
            let state = events.recv().await.unwrap();
            seen.push(state);
            if state.is_terminal() {
                break;
            }
        }

        assert_eq!(
            seen,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Backoff(1),
                ConnectionState::Connecting,
                ConnectionState::Backoff(2),
                ConnectionState::Connecting,
                ConnectionState::Failed,
            ]
        );
        let times = connector.attempt_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
    }

    /// `stop` returns and closes the sink whatever the connection is doing
    #[tokio::test]
    async fn test_stop_terminates_in_every_state() {
        let cases = [
            (ConnectStep::Accept, 5, ConnectionState::Connected),
            (ConnectStep::Hang, 5, ConnectionState::Connecting),
            (ConnectStep::Refuse, 5, ConnectionState::Backoff(1)),
            (ConnectStep::Refuse, 0, ConnectionState::Failed),
        ];

        for (step, max_retries, target) in cases {
            let sink = NetworkSink::with_connector(
                "network",
                fast_config(max_retries, Duration::from_secs(60)),
                ScriptedConnector::new(step),
            );
            let manager = sink.manager().clone();
            let mut events = manager.subscribe();
            let mut dispatcher = SampleDispatcher::new(sink, DispatcherConfig::default());

            dispatcher.start().await.unwrap();
            timeout(Duration::from_secs(5), wait_for(&mut events, target))
                .await
                .unwrap_or_else(|_| panic!("never reached {target}"));
            dispatcher
                .submit(Sample::acceleration(0.0, 1.0, 2.0, 3.0))
                .unwrap();

            timeout(Duration::from_secs(5), dispatcher.stop())
                .await
                .unwrap_or_else(|_| panic!("stop hung in {target}"))
                .unwrap();

            assert!(!dispatcher.is_running());
            assert_eq!(manager.current_state(), ConnectionState::Disconnected);
            assert!(dispatcher.submit(Sample::acceleration(1.0, 0.0, 0.0, 0.0)).is_err());
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use contracts::{ConnectionConfig, ConnectionState, Sample};
    use dispatcher::{
        AnySink, DispatcherConfig, DispatcherError, FileSink, FileSinkConfig, NetworkSink,
        StreamDispatcher,
    };
    use observability::StreamMetricsAggregator;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    /// Accept one connection and return everything it sends until EOF
    async fn spawn_server() -> (u16, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).await.unwrap();
            received
        });
        (port, server)
    }

    fn network_sink(port: u16) -> NetworkSink {
        NetworkSink::new("network", ConnectionConfig::new("127.0.0.1", port))
    }

    /// A connected network sink puts exactly `1.00,2.00,3.00\n` on the wire
    #[tokio::test]
    async fn test_sample_bytes_on_the_wire() {
        let (port, server) = spawn_server().await;
        let sink = network_sink(port);
        let manager = sink.manager().clone();
        let mut dispatcher = StreamDispatcher::new(AnySink::from(sink), DispatcherConfig::default());

        let mut events = manager.subscribe();
        let mut aggregator = StreamMetricsAggregator::new();
        dispatcher.start().await.unwrap();
        timeout(Duration::from_secs(5), async {
            loop {
                let state = events.recv().await.unwrap();
                aggregator.observe_state(state);
                if state == ConnectionState::Connected {
                    break;
                }
            }
        })
        .await
        .expect("never connected");

        dispatcher
            .submit(Sample::acceleration(0.0, 1.0, 2.0, 3.0))
            .unwrap();
        dispatcher.stop().await.unwrap();

        let received = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert_eq!(received.as_bytes(), b"1.00,2.00,3.00\n");
        assert_eq!(dispatcher.metrics().write_count, 1);
        assert_eq!(aggregator.connections, 1);
        assert_eq!(aggregator.retries, 0);
    }

    /// Network to file while stopped: every sample lands exactly once, in order
    #[tokio::test]
    async fn test_switch_network_to_file_while_stopped() {
        let (port, server) = spawn_server().await;
        let dir = tempdir().unwrap();
        let path = dir.path().join("after-switch.txt");
        let file_sink = || {
            AnySink::from(FileSink::new(
                "file",
                FileSinkConfig {
                    path: path.clone(),
                    precision: 2,
                },
            ))
        };

        let network = network_sink(port);
        let manager = network.manager().clone();
        let mut dispatcher = StreamDispatcher::new(AnySink::from(network), DispatcherConfig::default());
        let mut events = manager.subscribe();
        dispatcher.start().await.unwrap();
        timeout(Duration::from_secs(5), async {
            while events.recv().await.ok() != Some(ConnectionState::Connected) {}
        })
        .await
        .expect("network sink never connected");

        for i in 0..50 {
            dispatcher
                .submit(Sample::acceleration(0.0, f64::from(i), 0.0, 0.0))
                .unwrap();
        }

        // Switching while running is refused and leaves the run untouched
        assert!(matches!(
            dispatcher.replace_sink(file_sink()),
            Err(DispatcherError::InvalidState { .. })
        ));
        assert!(dispatcher.is_running());

        dispatcher.stop().await.unwrap();
        let previous = dispatcher.replace_sink(file_sink()).unwrap();
        assert!(matches!(previous, Some(AnySink::Network(_))));

        dispatcher.start().await.unwrap();
        for i in 50..100 {
            dispatcher
                .submit(Sample::acceleration(0.0, f64::from(i), 0.0, 0.0))
                .unwrap();
        }
        dispatcher.stop().await.unwrap();

        let wire = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        let file = std::fs::read_to_string(&path).unwrap();

        let mut delivered: Vec<u32> = wire
            .lines()
            .map(|line| line.split(',').next().unwrap().parse::<f64>().unwrap() as u32)
            .collect();
        delivered.extend(file.lines().map(|line| {
            let x = line
                .strip_prefix("Acc: X=")
                .and_then(|rest| rest.split(',').next())
                .unwrap();
            x.parse::<f64>().unwrap() as u32
        }));

        assert_eq!(delivered, (0..100).collect::<Vec<_>>());
        let metrics = dispatcher.metrics();
        assert_eq!(metrics.dropped_count, 0);
        assert_eq!(metrics.failure_count, 0);
    }

    /// A sink from config writes to the configured file
    #[tokio::test]
    async fn test_sink_from_config() {
        let dir = tempdir().unwrap();
        let mut config = contracts::StreamerConfig::default();
        config.file.path = dir.path().join("nested").join("SensorData.txt");
        config.file.precision = 1;

        let mut dispatcher = StreamDispatcher::new(
            AnySink::from_config(&config),
            DispatcherConfig::from(&config.collection),
        );
        dispatcher.start().await.unwrap();
        dispatcher
            .submit(Sample::quaternion(0.0, 1.0, 0.0, 0.0, 0.0))
            .unwrap();
        dispatcher.stop().await.unwrap();

        let content = std::fs::read_to_string(&config.file.path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("Quat: W=1.0"), "got: {content}");
    }
}
