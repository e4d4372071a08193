// NexusLIMS Logger - tests/http_clients.rs
//
// The database API and object store clients against a local mock HTTP
// server. Both clients are blocking and own an internal runtime, so each
// client is built, used and dropped on a `spawn_blocking` thread while the
// mock server runs on the tokio runtime.

use nexuslims_logger::core::model::{EventType, NewSessionLog, RecordStatus};
use nexuslims_logger::platform::dbapi::{DbApi, HttpDbApi};
use nexuslims_logger::platform::storage::{
    GcsObjectStore, ObjectStore, StorageAuth, UploadRequest,
};
use nexuslims_logger::util::error::{DbApiError, StorageError};
use std::collections::BTreeMap;
use wiremock::matchers::{basic_auth, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

/// Run `f` against a client for `base` with the service credentials.
async fn with_api<T: Send + 'static>(
    base: String,
    f: impl FnOnce(HttpDbApi) -> T + Send + 'static,
) -> T {
    blocking(move || {
        let client = HttpDbApi::new(&base, Some("svc".to_string()), Some("s3cret".to_string()))
            .unwrap();
        f(client)
    })
    .await
}

// =============================================================================
// Database API
// =============================================================================

#[tokio::test]
async fn health_check_accepts_only_the_session_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("API for nexuslims-db"))
        .mount(&server)
        .await;
    with_api(server.uri(), |client| client.health_check()).await.unwrap();

    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>It works!</html>"))
        .mount(&other)
        .await;
    let err = with_api(other.uri(), |client| client.health_check())
        .await
        .unwrap_err();
    assert!(matches!(err, DbApiError::Unhealthy { .. }), "{err}");
}

#[tokio::test]
async fn instrument_lookup_sends_computer_name_and_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/instrument"))
        .and(query_param("computer_name", "titan-pc"))
        .and(basic_auth("svc", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "instrument_pid": "FEI-Titan-TEM-635816",
                "schema_name": "FEI Titan TEM",
                "filestore_path": "./Titan",
                "location": "B101"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = with_api(server.uri(), |client| {
        client.instrument_for_computer("titan-pc")
    })
    .await
    .unwrap();
    assert_eq!(info.instrument_pid, "FEI-Titan-TEM-635816");
    assert_eq!(info.bucket_dir(), "Titan");
    assert_eq!(info.extra["location"], "B101");
}

#[tokio::test]
async fn last_session_not_found_means_no_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lastsession"))
        .and(query_param("instrument", "FEI-Titan-TEM-635816"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no sessions"))
        .mount(&server)
        .await;

    let last = with_api(server.uri(), |client| {
        client.last_session_for_instrument("FEI-Titan-TEM-635816")
    })
    .await
    .unwrap();
    assert!(last.is_none());
}

#[tokio::test]
async fn last_session_event_decodes_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lastsession"))
        .and(query_param("session_identifier", "abc-123"))
        .and(query_param("event_type", "START"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "id_session_log": 42,
                "event_type": "START",
                "session_identifier": "abc-123",
                "instrument": "FEI-Titan-TEM-635816",
                "user": "operator",
                "timestamp": "Tue, 05 Mar 2024 10:00:00 GMT",
                "record_status": "WAITING_FOR_END"
            }
        })))
        .mount(&server)
        .await;

    let row = with_api(server.uri(), |client| {
        client.last_session_event("abc-123", EventType::Start)
    })
    .await
    .unwrap();
    assert_eq!(row.id_session_log, 42);
    assert_eq!(row.event(), Some(EventType::Start));
}

#[tokio::test]
async fn insert_posts_form_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .and(body_string_contains("event_type=END"))
        .and(body_string_contains("session_identifier=abc-123"))
        .and(body_string_contains("record_status=TO_BE_BUILT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let log = NewSessionLog {
        event_type: EventType::End,
        instrument: "FEI-Titan-TEM-635816".to_string(),
        user: "operator".to_string(),
        session_identifier: "abc-123".to_string(),
        session_note: "beam drift".to_string(),
        record_status: Some(RecordStatus::ToBeBuilt),
    };
    with_api(server.uri(), move |client| client.insert_session_log(&log))
        .await
        .unwrap();
}

#[tokio::test]
async fn error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database locked"))
        .mount(&server)
        .await;

    let err = with_api(server.uri(), |client| {
        client.update_record_status(42, RecordStatus::ToBeBuilt)
    })
    .await
    .unwrap_err();
    match err {
        DbApiError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database locked");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nexus/api/session"))
        .and(query_param("id_session_log", "7"))
        .and(query_param("record_status", "TO_BE_BUILT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id_session_log": 7,
                "event_type": "START",
                "session_identifier": "abc-123",
                "record_status": "TO_BE_BUILT"
            }]
        })))
        .mount(&server)
        .await;

    let base = format!("{}/nexus", server.uri());
    let row = blocking(move || {
        let client = HttpDbApi::new(&base, None, None)?;
        client.session_log(7, RecordStatus::ToBeBuilt)
    })
    .await
    .unwrap();
    assert_eq!(row.record_status.as_deref(), Some("TO_BE_BUILT"));
}

// =============================================================================
// Object store
// =============================================================================

#[tokio::test]
async fn upload_sends_media_then_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/nexus-data/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "Titan/img.dm3"))
        .and(body_string_contains("pixels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/storage/v1/b/nexus-data/o/Titan%2Fimg.dm3"))
        .and(body_string_contains("\"instr_name\":\"FEI Titan TEM\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("img.dm3");
    std::fs::write(&file, b"pixels").unwrap();

    let endpoint = url::Url::parse(&server.uri()).unwrap();
    let bytes = blocking(move || {
        let store = GcsObjectStore::new("nexus-data", endpoint, StorageAuth::Anonymous)?;
        let mut metadata = BTreeMap::new();
        metadata.insert("instr_name".to_string(), "FEI Titan TEM".to_string());
        store.upload(&UploadRequest {
            path: &file,
            object_name: "Titan/img.dm3",
            metadata: &metadata,
        })
    })
    .await
    .unwrap();
    assert_eq!(bytes, 6);
}

#[tokio::test]
async fn rejected_upload_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/nexus-data/o"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("img.dm3");
    std::fs::write(&file, b"pixels").unwrap();

    let endpoint = url::Url::parse(&server.uri()).unwrap();
    let err = blocking(move || {
        let store = GcsObjectStore::new("nexus-data", endpoint, StorageAuth::Anonymous)?;
        store.upload(&UploadRequest {
            path: &file,
            object_name: "Titan/img.dm3",
            metadata: &BTreeMap::new(),
        })
    })
    .await
    .unwrap_err();
    assert!(matches!(err, StorageError::Status { status: 403, .. }), "{err}");
}
