//! Tests for the reconnect module

use super::*;
use std::time::Duration;

mod backoff_tests {
    use super::*;

    #[test]
    fn test_backoff_first_attempt() {
        let backoff = BackoffStrategy::new(50, 2_000);
        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_exponential_growth() {
        let backoff = BackoffStrategy::new(50, 2_000);

        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(50));
        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(backoff.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(backoff.calculate_delay(4), Duration::from_millis(800));
        assert_eq!(backoff.calculate_delay(5), Duration::from_millis(1600));
    }

    #[test]
    fn test_backoff_capped_at_two_seconds() {
        let backoff = BackoffStrategy::default();

        assert_eq!(backoff.calculate_delay(6), Duration::from_millis(2_000));
        assert_eq!(backoff.calculate_delay(50), Duration::from_millis(2_000));
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn test_backoff_custom_multiplier() {
        let backoff = BackoffStrategy::new(100, 30_000).with_multiplier(3.0);

        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(300));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(900));
    }

    #[test]
    fn test_backoff_with_jitter() {
        let backoff = BackoffStrategy::new(1000, 30_000).with_jitter(true);

        for _ in 0..20 {
            let delay = backoff.calculate_delay(0);
            assert!(
                delay >= Duration::from_millis(750) && delay <= Duration::from_millis(1250),
                "Delay {:?} should be between 750ms and 1250ms",
                delay
            );
        }
    }

    #[test]
    fn test_backoff_bounds_are_normalized() {
        assert_eq!(
            BackoffStrategy::new(0, 1000).initial_delay(),
            Duration::from_millis(1)
        );
        assert_eq!(
            BackoffStrategy::new(1000, 100).max_delay(),
            Duration::from_millis(1000)
        );
        assert_eq!(BackoffStrategy::new(100, 1000).with_multiplier(0.5).multiplier(), 1.0);
    }

    #[test]
    fn test_backoff_default() {
        let backoff = BackoffStrategy::default();

        assert_eq!(backoff.initial_delay(), Duration::from_millis(50));
        assert_eq!(backoff.max_delay(), Duration::from_millis(2_000));
        assert_eq!(backoff.multiplier(), 2.0);
        assert!(!backoff.has_jitter());
    }
}

mod reconnect_config_tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();

        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.backoff(), &BackoffStrategy::default());
        assert!(!config.offline_queue());
    }

    #[test]
    fn test_reconnect_config_with_offline_queue() {
        let config = ReconnectConfig::new(5, BackoffStrategy::new(10, 100)).with_offline_queue(true);

        assert_eq!(config.max_attempts(), 5);
        assert!(config.offline_queue());
    }

    #[test]
    fn test_reconnect_event_debug() {
        let event = ReconnectEvent::Failed {
            attempt: 2,
            error: "Connection refused".into(),
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("Failed"));
        assert!(debug.contains("Connection refused"));
    }
}

mod wrapper_tests {
    use super::*;
    use async_trait::async_trait;
    use kvpool_core::{
        Connection, ConnectionStatus, Connector, Endpoint, KvError, Result, StatusCell, Value,
    };
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Failure a scripted client returns instead of a reply
    #[derive(Debug, Clone, Copy)]
    enum Fault {
        Connection,
        ReadOnly,
        Command,
    }

    impl Fault {
        fn into_error(self) -> KvError {
            match self {
                Fault::Connection => KvError::Connection("Mock connection reset".into()),
                Fault::ReadOnly => {
                    KvError::ReadOnly("READONLY You can't write against a read only replica.".into())
                }
                Fault::Command => KvError::Command("ERR unknown command".into()),
            }
        }
    }

    /// Faults shared by every client a connector opens; `None` forever fails
    struct Script {
        faults: Mutex<VecDeque<Fault>>,
        forever: Option<Fault>,
    }

    impl Script {
        fn next(&self) -> Option<Fault> {
            self.faults.lock().pop_front().or(self.forever)
        }
    }

    struct MockClient {
        status: StatusCell,
        script: Arc<Script>,
        commands: AtomicU32,
    }

    #[async_trait]
    impl Connection for MockClient {
        fn backend_name(&self) -> &str {
            "mock"
        }

        async fn execute(&self, _command: &str, _args: &[Value]) -> Result<Value> {
            self.commands.fetch_add(1, Ordering::SeqCst);
            match self.script.next() {
                Some(fault) => Err(fault.into_error()),
                None => Ok(Value::String("PONG".into())),
            }
        }

        async fn close(&self) -> Result<()> {
            self.status.set(ConnectionStatus::Closed);
            Ok(())
        }

        fn status_cell(&self) -> &StatusCell {
            &self.status
        }
    }

    struct MockConnector {
        script: Arc<Script>,
        connects: AtomicU32,
        /// Applied to every connect after the first
        reconnect_delay: Duration,
    }

    impl MockConnector {
        fn new(faults: Vec<Fault>) -> Self {
            Self::scripted(faults, None)
        }

        fn always_failing(fault: Fault) -> Self {
            Self::scripted(Vec::new(), Some(fault))
        }

        fn scripted(faults: Vec<Fault>, forever: Option<Fault>) -> Self {
            Self {
                script: Arc::new(Script {
                    faults: Mutex::new(faults.into()),
                    forever,
                }),
                connects: AtomicU32::new(0),
                reconnect_delay: Duration::ZERO,
            }
        }

        fn with_reconnect_delay(mut self, delay: Duration) -> Self {
            self.reconnect_delay = delay;
            self
        }

        fn connects(&self) -> u32 {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn id(&self) -> &'static str {
            "mock"
        }

        async fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn Connection>> {
            let previous = self.connects.fetch_add(1, Ordering::SeqCst);
            if previous > 0 && !self.reconnect_delay.is_zero() {
                tokio::time::sleep(self.reconnect_delay).await;
            }
            Ok(Arc::new(MockClient {
                status: StatusCell::new(ConnectionStatus::Ready),
                script: Arc::clone(&self.script),
                commands: AtomicU32::new(0),
            }))
        }
    }

    async fn open(
        connector: &Arc<MockConnector>,
        config: ReconnectConfig,
    ) -> Arc<ReconnectingConnection> {
        let connector: Arc<dyn Connector> = Arc::clone(connector) as Arc<dyn Connector>;
        ReconnectingConnection::connect(connector, Endpoint::default(), config)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_succeeds_without_reconnect() {
        let connector = Arc::new(MockConnector::new(vec![]));
        let conn = open(&connector, ReconnectConfig::default()).await;

        let reply = conn.execute("PING", &[]).await.unwrap();
        assert_eq!(reply.as_str(), Some("PONG"));
        assert_eq!(conn.reconnect_count(), 0);
        assert_eq!(conn.status(), ConnectionStatus::Ready);
        assert_eq!(conn.backend_name(), "mock");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_retry_with_backoff() {
        let connector = Arc::new(MockConnector::new(vec![Fault::Connection, Fault::Connection]));
        let conn = open(&connector, ReconnectConfig::default()).await;

        let start = tokio::time::Instant::now();
        conn.execute("GET", &["key".into()]).await.unwrap();

        // 50ms then 100ms of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(155));
        assert_eq!(conn.reconnect_count(), 2);
        assert_eq!(connector.connects(), 3);
        assert_eq!(conn.status(), ConnectionStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_reconnects_immediately() {
        let connector = Arc::new(MockConnector::new(vec![Fault::ReadOnly]));
        let conn = open(&connector, ReconnectConfig::default()).await;

        let start = tokio::time::Instant::now();
        conn.execute("SET", &["key".into(), "value".into()]).await.unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(conn.reconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_errors_are_not_retried() {
        let connector = Arc::new(MockConnector::new(vec![Fault::Command]));
        let conn = open(&connector, ReconnectConfig::default()).await;

        let err = conn.execute("BOGUS", &[]).await.unwrap_err();
        assert!(matches!(err, KvError::Command(_)));
        assert_eq!(connector.connects(), 1);
        assert_eq!(conn.status(), ConnectionStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_mark_errored() {
        let connector = Arc::new(MockConnector::always_failing(Fault::Connection));
        let config = ReconnectConfig::new(2, BackoffStrategy::new(50, 2_000));
        let conn = open(&connector, config).await;

        let err = conn.execute("PING", &[]).await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(connector.connects(), 3);
        assert_eq!(conn.status(), ConnectionStatus::Errored);
        assert!(conn.is_closed());

        // Permanently failed, no further reconnects
        assert!(conn.execute("PING", &[]).await.is_err());
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_fails_on_first_error() {
        let connector = Arc::new(MockConnector::new(vec![Fault::Connection]));
        let config = ReconnectConfig::new(0, BackoffStrategy::default());
        let conn = open(&connector, config).await;

        assert!(conn.execute("PING", &[]).await.is_err());
        assert_eq!(connector.connects(), 1);
        assert_eq!(conn.status(), ConnectionStatus::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_queue_disabled_fails_fast_while_reconnecting() {
        let connector = Arc::new(
            MockConnector::new(vec![Fault::Connection])
                .with_reconnect_delay(Duration::from_secs(1)),
        );
        let conn = open(&connector, ReconnectConfig::default()).await;

        let retrying = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute("PING", &[]).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(conn.is_reconnecting());

        let err = conn.execute("PING", &[]).await.unwrap_err();
        assert!(matches!(err, KvError::Connection(_)));

        assert!(retrying.await.unwrap().is_ok());
        assert!(!conn.is_reconnecting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_queue_enabled_waits_for_reconnect() {
        let connector = Arc::new(
            MockConnector::new(vec![Fault::Connection])
                .with_reconnect_delay(Duration::from_secs(1)),
        );
        let config = ReconnectConfig::default().with_offline_queue(true);
        let conn = open(&connector, config).await;

        let retrying = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute("PING", &[]).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(conn.is_reconnecting());

        let start = tokio::time::Instant::now();
        conn.execute("PING", &[]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));

        assert!(retrying.await.unwrap().is_ok());
        assert_eq!(conn.reconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reconnect_clears_flag() {
        let connector = Arc::new(
            MockConnector::new(vec![Fault::ReadOnly])
                .with_reconnect_delay(Duration::from_secs(1)),
        );
        let conn = open(&connector, ReconnectConfig::default()).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(100),
            conn.execute("SET", &["key".into(), "value".into()]),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(!conn.is_reconnecting());
        assert_eq!(conn.status(), ConnectionStatus::Ready);

        // The next command is not rejected as mid-reconnect and opens a new client
        let reply = conn.execute("PING", &[]).await.unwrap();
        assert_eq!(reply.as_str(), Some("PONG"));
        assert_eq!(conn.reconnect_count(), 1);
        assert_eq!(connector.connects(), 3);
        assert!(!conn.is_reconnecting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_terminal() {
        let connector = Arc::new(MockConnector::new(vec![]));
        let conn = open(&connector, ReconnectConfig::default()).await;

        conn.close().await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Closed);
        assert!(conn.execute("PING", &[]).await.is_err());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnecting_connector_wraps_clients() {
        let connector = ReconnectingConnector::new(
            MockConnector::new(vec![Fault::Connection]),
            ReconnectConfig::default(),
        );
        assert_eq!(connector.id(), "mock");

        let conn = connector.connect(&Endpoint::default()).await.unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Ready);

        // The wrapped client absorbs the connection error
        conn.execute("PING", &[]).await.unwrap();
    }
}
