//! Unit tests for the Redis connector

use crate::driver::{RedisConnector, build_command, map_redis_error, redis_value_to_value};
use kvpool_core::{Connector, Endpoint, KvError, Value};
use pretty_assertions::assert_eq;

fn packed(cmd: &redis::Cmd) -> String {
    String::from_utf8(cmd.get_packed_command()).unwrap()
}

mod command_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inline_arguments_then_args() {
        let cmd = build_command("set key", &["value".into()]).unwrap();
        assert_eq!(
            packed(&cmd),
            "*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"
        );
    }

    #[test]
    fn test_numeric_and_bool_args() {
        let cmd = build_command("EXPIRE", &["session".into(), Value::Int64(60)]).unwrap();
        assert_eq!(
            packed(&cmd),
            "*3\r\n$6\r\nEXPIRE\r\n$7\r\nsession\r\n$2\r\n60\r\n"
        );

        let cmd = build_command("ECHO", &[Value::Bool(true)]).unwrap();
        assert_eq!(packed(&cmd), "*2\r\n$4\r\nECHO\r\n$1\r\n1\r\n");
    }

    #[test]
    fn test_array_args_are_flattened() {
        let keys = Value::Array(vec!["a".into(), "b".into()]);
        let cmd = build_command("DEL", &[keys]).unwrap();
        assert_eq!(
            packed(&cmd),
            "*3\r\n$3\r\nDEL\r\n$1\r\na\r\n$1\r\nb\r\n"
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(build_command("   ", &[]), Err(KvError::Command(_))));
    }
}

mod error_mapping_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_only_error() {
        let error = redis::RedisError::from((
            redis::ErrorKind::ReadOnly,
            "You can't write against a read only replica.",
        ));
        let mapped = map_redis_error(error);
        assert!(mapped.is_read_only());
        assert!(!mapped.is_connection_error());
    }

    #[test]
    fn test_io_error_is_connection_error() {
        let error = redis::RedisError::from(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        ));
        assert!(matches!(map_redis_error(error), KvError::Connection(_)));
    }

    #[test]
    fn test_command_error() {
        let error = redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "Operation against a key holding the wrong kind of value",
        ));
        assert!(matches!(map_redis_error(error), KvError::Command(_)));
    }
}

mod value_conversion_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalar_replies() {
        assert_eq!(redis_value_to_value(&redis::Value::Nil).unwrap(), Value::Null);
        assert_eq!(redis_value_to_value(&redis::Value::Int(7)).unwrap(), Value::Int64(7));
        assert_eq!(
            redis_value_to_value(&redis::Value::Okay).unwrap(),
            Value::String("OK".into())
        );
        assert_eq!(
            redis_value_to_value(&redis::Value::SimpleString("PONG".into())).unwrap(),
            Value::String("PONG".into())
        );
        assert_eq!(
            redis_value_to_value(&redis::Value::Double(1.5)).unwrap(),
            Value::Float64(1.5)
        );
        assert_eq!(
            redis_value_to_value(&redis::Value::Boolean(true)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_bulk_strings() {
        assert_eq!(
            redis_value_to_value(&redis::Value::BulkString(b"hello".to_vec())).unwrap(),
            Value::String("hello".into())
        );
        assert_eq!(
            redis_value_to_value(&redis::Value::BulkString(vec![0xff, 0xfe])).unwrap(),
            Value::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_nested_arrays() {
        let reply = redis::Value::Array(vec![
            redis::Value::BulkString(b"a".to_vec()),
            redis::Value::Array(vec![redis::Value::Int(1), redis::Value::Nil]),
        ]);
        assert_eq!(
            redis_value_to_value(&reply).unwrap(),
            Value::Array(vec![
                Value::String("a".into()),
                Value::Array(vec![Value::Int64(1), Value::Null]),
            ])
        );
    }

    #[test]
    fn test_map_is_flattened() {
        let reply = redis::Value::Map(vec![(
            redis::Value::SimpleString("field".into()),
            redis::Value::Int(3),
        )]);
        assert_eq!(
            redis_value_to_value(&reply).unwrap(),
            Value::Array(vec![Value::String("field".into()), Value::Int64(3)])
        );
    }

    #[test]
    fn test_top_level_error_reply() {
        let reply = redis::Value::ServerError(redis::ServerError::ExtensionError {
            code: "WRONGTYPE".into(),
            detail: Some("Operation against a key holding the wrong kind of value".into()),
        });
        let err = redis_value_to_value(&reply).unwrap_err();
        assert!(matches!(err, KvError::Command(_)));
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[test]
    fn test_nested_error_reply_fails_conversion() {
        // EXEC where the second queued command failed
        let reply = redis::Value::Array(vec![
            redis::Value::Okay,
            redis::Value::ServerError(redis::ServerError::ExtensionError {
                code: "WRONGTYPE".into(),
                detail: Some("Operation against a key holding the wrong kind of value".into()),
            }),
        ]);
        let err = redis_value_to_value(&reply).unwrap_err();
        assert!(matches!(err, KvError::Command(_)));
    }

    #[test]
    fn test_nested_read_only_reply_keeps_classification() {
        let reply = redis::Value::Map(vec![(
            redis::Value::SimpleString("result".into()),
            redis::Value::ServerError(redis::ServerError::KnownError {
                kind: redis::ServerErrorKind::ReadOnly,
                detail: Some("You can't write against a read only replica.".into()),
            }),
        )]);
        assert!(redis_value_to_value(&reply).unwrap_err().is_read_only());
    }
}

mod connector_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_connector_id() {
        assert_eq!(RedisConnector::new().id(), "redis");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let endpoint = Endpoint::new("127.0.0.1", 1);
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), RedisConnector::new().connect(&endpoint))
                .await;

        // A firewalled port may hang instead of refusing; that is not a failure here
        if let Ok(result) = outcome {
            assert!(matches!(result, Err(KvError::Connection(_))));
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server (set KVPOOL_TEST_URL)"]
    async fn test_round_trip_against_server() {
        let url =
            std::env::var("KVPOOL_TEST_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into());
        let endpoint = Endpoint::from_url(&url).unwrap();
        let conn = RedisConnector::new().connect(&endpoint).await.unwrap();

        conn.execute("SET kvpool:test", &["value".into()])
            .await
            .unwrap();
        let value = conn.execute("GET kvpool:test", &[]).await.unwrap();
        assert_eq!(value, Value::String("value".into()));
        assert_eq!(
            conn.execute("PING", &[]).await.unwrap(),
            Value::String("PONG".into())
        );

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(conn.execute("PING", &[]).await.is_err());
    }
}
