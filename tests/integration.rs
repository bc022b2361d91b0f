use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use stream_vault::storage::local_store::LocalFilesystemStore;
use stream_vault::storage::select_backend;
use stream_vault::{
    AppConfig, AppState, DataPoint, DataSet, Day, Error, SampleValue, StreamIdentity, StreamMetadata,
};
use tempfile::tempdir;
use uuid::Uuid;

fn day(s: &str) -> Day {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_filesystem_save_and_get_complete() {
    let raw = tempdir().unwrap();
    let db = tempdir().unwrap();
    let config = AppConfig::for_filesystem(
        raw.path().to_string_lossy(),
        db.path().join("metadata.sqlite").to_string_lossy(),
    );
    let state = AppState::from_config(config).await.expect("Failed to build app state");
    let handler = &state.stream_handler;

    let identity = handler.resolve_identity("hr_stream", Uuid::new_v4()).await.unwrap();
    handler
        .save_stream(&identity, day("2024-01-01"), Bytes::from_static(b"\x01\x02\x03"), StreamMetadata::default())
        .await
        .expect("Save failed");

    let stream = handler
        .get_stream("hr_stream", Some(day("2024-01-01")), None, None, DataSet::Complete)
        .await
        .expect("Get failed");
    assert_eq!(stream.payload(), b"\x01\x02\x03");
    assert_eq!(stream.metadata, Some(StreamMetadata::default()));
    assert_eq!(stream.identity.as_ref(), Some(&identity));

    let on_disk = raw.path().join(identity.stream_id.to_string()).join("20240101");
    assert_eq!(std::fs::read(on_disk).unwrap(), b"\x01\x02\x03");
}

#[tokio::test]
async fn test_unsupported_store_fails_at_startup() {
    let config = AppConfig::from_yaml_str("nosql_storage: unsupported_store\n").unwrap();

    let err = select_backend(&config).await.err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("unsupported_store"));

    let err = AppState::from_config(config).await.err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_yaml_configured_samples_round_trip() {
    let raw = tempdir().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "nosql_storage: filesystem\nfilesystem:\n  filesystem_path: {}\nmetadata:\n  db_path: \":memory:\"",
        raw.path().display()
    )
    .unwrap();

    let state = AppState::from_config(AppConfig::load(file.path()).unwrap()).await.unwrap();
    let handler = &state.stream_handler;
    let owner = Uuid::new_v4();
    let identity = StreamIdentity::new("accel_stream", owner);

    let base = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let samples: Vec<DataPoint> = (0..5)
        .rev()
        .map(|i| DataPoint::new(base + chrono::Duration::seconds(i), -18_000_000, SampleValue::Vector(vec![i as f64, 0.0, 9.8])))
        .collect();
    handler
        .save_samples(&identity, day("20240310"), samples, StreamMetadata::default())
        .await
        .unwrap();

    let decoded = handler.get_stream_samples("accel_stream", None, None, None).await.unwrap();
    assert_eq!(decoded.len(), 5);
    assert!(decoded.windows(2).all(|pair| pair[0].start_time <= pair[1].start_time));
    assert_eq!(handler.get_stream_days("accel_stream").await.unwrap(), vec![day("2024-03-10")]);
    assert_eq!(handler.get_user_streams(owner).await.unwrap(), vec![identity]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_to_different_days() {
    let raw = tempdir().unwrap();
    let config = AppConfig::for_filesystem(raw.path().to_string_lossy(), ":memory:");
    let state = AppState::from_config(config).await.unwrap();
    let identity = Arc::new(StreamIdentity::new("hr_stream", Uuid::new_v4()));

    let mut handles = vec![];
    for d in 1..=7 {
        let handler = state.stream_handler.clone();
        let identity = identity.clone();
        handles.push(tokio::spawn(async move {
            handler
                .save_stream(
                    &identity,
                    day(&format!("2024-01-{:02}", d)),
                    Bytes::from(vec![d as u8; 1024]),
                    StreamMetadata::default(),
                )
                .await
        }));
    }
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("Save blocked")
            .unwrap()
            .expect("Save failed");
    }

    let stream = state
        .stream_handler
        .get_stream("hr_stream", None, None, None, DataSet::OnlyData)
        .await
        .unwrap();
    assert_eq!(stream.data.len(), 7);
    assert!(stream.metadata.is_none());
}

#[test]
fn test_filesystem_store_requires_existing_path() {
    let err = LocalFilesystemStore::new(&stream_vault::config::FilesystemConfig {
        filesystem_path: "/nonexistent/stream_vault/raw".to_string(),
    })
    .err()
    .unwrap();
    assert!(matches!(err, Error::Configuration(_)));
}
