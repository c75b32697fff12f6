//! Dataset and stream lifecycles against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port with a store the test keeps a
//! handle on, then drives `DomoClient` over real HTTP through the default
//! ureq transport. The store handle lets tests count token grants and look at
//! execution state directly.

use domo_core::{
    ApiError, Column, Credentials, DatasetId, DomoClient, HttpMethod, HttpRequest, Transport,
    UpdateMethod, UreqTransport,
};
use mock_server::{Db, Store};

fn start_server(store: Store) -> (String, Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let db = Db::new(tokio::sync::RwLock::new(store));
    let server_db = db.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, server_db).await
        })
        .unwrap();
    });

    (format!("http://{addr}"), db)
}

fn client(base_url: &str) -> DomoClient {
    DomoClient::new("id", "secret").with_api_host(base_url)
}

fn test_columns() -> Vec<Column> {
    vec![Column::string("Status"), Column::string("Test Value")]
}

#[test]
fn empty_credentials_never_reach_the_server() {
    let (base_url, db) = start_server(Store::default());
    let mut client = DomoClient::new("", "").with_api_host(&base_url);

    let err = client.authenticate().unwrap_err();
    assert!(matches!(err, ApiError::Config(_)));
    let err = client.list_datasets().unwrap_err();
    assert!(matches!(err, ApiError::Config(_)));

    assert_eq!(db.blocking_read().token_requests, 0);
}

#[test]
fn wrong_credentials_surface_as_transport_status() {
    let (base_url, _db) = start_server(Store::with_client("id", "right"));
    let mut client = DomoClient::new("id", "wrong").with_api_host(&base_url);
    let err = client.authenticate().unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!client.is_authenticated());
}

#[test]
fn token_is_requested_once_per_client() {
    let (base_url, db) = start_server(Store::with_client("id", "secret"));
    let mut client = client(&base_url);
    assert!(!client.is_authenticated());

    let listing = client.list_datasets().unwrap();
    assert_eq!(listing.status, 200);
    let datasets: Vec<serde_json::Value> = listing.json().unwrap();
    assert!(datasets.is_empty());
    assert_eq!(db.blocking_read().token_requests, 1);

    client.list_datasets().unwrap();
    let created = client.create_dataset("Once", "", &test_columns()).unwrap();
    client.get_dataset(&created.id).unwrap();
    assert_eq!(db.blocking_read().token_requests, 1);

    // An explicit call always fetches a new token.
    client.authenticate().unwrap();
    assert_eq!(db.blocking_read().token_requests, 2);
}

#[test]
fn dataset_lifecycle() {
    let (base_url, _db) = start_server(Store::default());
    let mut client = client(&base_url);

    // Create.
    let created = client
        .create_dataset("Test Dataset", "For testing api only", &test_columns())
        .unwrap();
    assert_eq!(created.name, "Test Dataset");
    assert!(!created.id.as_str().is_empty());
    let id = created.id;

    // Append.
    let response = client.append_dataset(&id, "testing,foo\ntesting 1,foo squared").unwrap();
    assert_eq!(response.status, 204);
    let meta = client.get_dataset(&id).unwrap();
    assert_eq!(meta.rows, Some(2));

    // Widen the schema, then append a row that uses it.
    let mut columns = test_columns();
    columns.push(Column::string("New Column"));
    let updated = client.update_dataset(&id, &columns).unwrap();
    assert_eq!(updated.name, "Test Dataset");
    let response = client.append_dataset(&id, "new,column,test").unwrap();
    assert_eq!(response.status, 204);
    let meta = client.get_dataset(&id).unwrap();
    assert_eq!(meta.columns, Some(3));
    assert_eq!(meta.rows, Some(3));

    // Query and write the export back as a replacement.
    let csv = client.query_dataset(&id).unwrap();
    assert!(csv.starts_with("Status,Test Value,New Column\n"));
    let response = client.replace_dataset(&id, &csv).unwrap();
    assert_eq!(response.status, 204);
    let meta = client.get_dataset(&id).unwrap();
    assert_eq!(meta.columns, Some(3));
    assert_eq!(meta.rows, Some(3));

    // Delete.
    let response = client.delete_dataset(&id).unwrap();
    assert_eq!(response.status, 204);
    let err = client.get_dataset(&id).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, ApiError::Transport(_)));
}

#[test]
fn append_small_csv_returns_no_content() {
    let (base_url, _db) = start_server(Store::default());
    let mut client = client(&base_url);
    let dataset = client.create_dataset("Tiny", "", &test_columns()).unwrap();
    let response = client.append_dataset(&dataset.id, "a,b\nc,d").unwrap();
    assert_eq!(response.status, 204);
}

#[test]
fn query_exports_datasets_larger_than_ten_mib() {
    let (base_url, _db) = start_server(Store::default());
    let mut client = client(&base_url);
    let dataset = client.create_dataset("Large", "", &test_columns()).unwrap();

    // Each append stays under the server's 2 MB request body limit.
    let row = format!("{},{}\n", "s".repeat(60), "v".repeat(60));
    let chunk = row.repeat(12_000);
    assert!(chunk.len() < 2_000_000);
    for _ in 0..8 {
        let response = client.append_dataset(&dataset.id, &chunk).unwrap();
        assert_eq!(response.status, 204);
    }

    let csv = client.query_dataset(&dataset.id).unwrap();
    assert!(csv.len() > 10 * 1024 * 1024);
    assert!(csv.starts_with("Status,Test Value\n"));
    assert_eq!(csv.lines().count(), 1 + 8 * 12_000);
}

#[test]
fn error_statuses_come_back_as_responses() {
    let (base_url, _db) = start_server(Store::default());
    let request = HttpRequest {
        method: HttpMethod::Get,
        url: format!("{base_url}/v1/datasets"),
        headers: vec![("accept".to_string(), "application/json".to_string())],
        body: None,
    };
    let response = UreqTransport::default().execute(&request).unwrap();
    assert_eq!(response.status, 401);
    assert!(!response.is_success());
    assert!(response.body.contains("message"));
}

#[test]
fn query_missing_dataset_is_typed_http_error() {
    let (base_url, _db) = start_server(Store::default());
    let mut client = client(&base_url);
    let err = client.query_dataset(&DatasetId::from("missing")).unwrap_err();
    match err {
        ApiError::Http { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[test]
fn stream_lifecycle_commit() {
    let (base_url, db) = start_server(Store::default());
    let mut client = client(&base_url);

    let stream = client
        .create_stream("Test Dataset", "For testing api only", &test_columns(), UpdateMethod::Append)
        .unwrap();
    assert_eq!(stream.update_method, Some(UpdateMethod::Append));
    let dataset_id = stream.data_set.id.clone();
    assert_eq!(client.get_dataset(&dataset_id).unwrap().name, "Test Dataset");

    let execution = client.create_execution(&stream.id).unwrap();
    assert_eq!(execution.current_state.as_deref(), Some("ACTIVE"));
    client
        .upload_part(&stream.id, &execution.id, 1, "testing,foo\ntesting 1,foo squared")
        .unwrap();
    let committed = client.commit_execution(&stream.id, &execution.id).unwrap();
    assert_eq!(committed.current_state.as_deref(), Some("SUCCESS"));

    assert_eq!(client.get_dataset(&dataset_id).unwrap().rows, Some(2));
    assert_eq!(db.blocking_read().token_requests, 1);

    client.delete_dataset(&dataset_id).unwrap();
    assert!(client.get_dataset(&dataset_id).unwrap_err().is_not_found());
}

#[test]
fn stream_lifecycle_abort() {
    let (base_url, db) = start_server(Store::default());
    let mut client = client(&base_url);

    let stream = client
        .create_stream("Aborted", "", &test_columns(), UpdateMethod::Replace)
        .unwrap();
    let execution = client.create_execution(&stream.id).unwrap();
    client.upload_part(&stream.id, &execution.id, 1, "a,b").unwrap();

    let aborted = client.abort_execution(&stream.id, &execution.id).unwrap();
    assert_eq!(aborted.current_state.as_deref(), Some("ABORTED"));

    let err = client
        .upload_part(&stream.id, &execution.id, 2, "c,d")
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    let execution_id: u64 = execution.id.as_str().parse().unwrap();
    let store = db.blocking_read();
    assert_eq!(store.executions[&execution_id].execution.current_state, "ABORTED");
    assert!(store.executions[&execution_id].parts.is_empty());
}

#[test]
fn connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = DomoClient::with_transport(Credentials::new("id", "secret"), UreqTransport::new())
        .with_api_host(&format!("http://{addr}"));
    let err = client.authenticate().unwrap_err();
    assert!(matches!(
        err,
        ApiError::Transport(domo_core::TransportError::Connection(_))
    ));
}
