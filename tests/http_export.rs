//! End-to-end exports against a mocked chat API
//!
//! These tests drive [`ChatExporter::connect`] over real HTTP: message pages and
//! attachment blobs come from a wiremock server and artifacts land in a
//! temporary directory through [`DirectorySink`].

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chat_export::directory::{ChannelInfo, StaticDirectory};
use chat_export::types::ChannelKind;
use chat_export::{
    ChatExporter, Config, DirectorySink, ExportFormat, ExportRequest, IncludeFlags, Snowflake,
};
use serde_json::{Value, json};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message(id: u64, minute: u32, content: &str, attachments: Value) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": "10",
        "content": content,
        "timestamp": format!("2024-03-01T12:{minute:02}:00+00:00"),
        "edited_timestamp": null,
        "author": {
            "id": "7",
            "username": "ada",
            "discriminator": "0",
            "global_name": "Ada",
            "avatar": null
        },
        "attachments": attachments,
        "embeds": [],
        "mentions": [],
        "reactions": []
    })
}

fn config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.token = Some("token".into());
    config.api.courtesy_delay = Duration::ZERO;
    config.backoff.base_delay = Duration::from_millis(1);
    config.backoff.max_delay = Duration::from_millis(20);
    config.backoff.jitter_max = Duration::ZERO;
    config.attachments.retry_delay = Duration::from_millis(1);
    config
}

fn directory() -> Arc<StaticDirectory> {
    Arc::new(StaticDirectory::new().with_channel(ChannelInfo {
        id: Snowflake(10),
        kind: ChannelKind::Standard,
        name: Some("general".into()),
        guild_id: Some(Snowflake(1)),
        recipients: Vec::new(),
    }))
}

/// Serve `page` for the first request and an empty page once a cursor is sent
async fn serve_history(server: &MockServer, page: Value) {
    Mock::given(method("GET"))
        .and(path("/channels/10/messages"))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/10/messages"))
        .and(query_param("before", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn json_export_is_written_to_disk() {
    let server = MockServer::start().await;
    serve_history(
        &server,
        json!([
            message(102, 5, "second", json!([])),
            message(101, 1, "first", json!([])),
        ]),
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let exporter = ChatExporter::connect(config(&server), directory()).unwrap();
    let request = ExportRequest::channel(Snowflake(10)).with_format(ExportFormat::Json);

    let (report, saved) = exporter
        .export_to(&request, &DirectorySink::new(temp_dir.path()))
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.message_count, 2);
    assert!(report.artifact.filename.starts_with("export-general-"));
    assert!(report.artifact.filename.ends_with(".json"));

    let envelope: Value = serde_json::from_slice(&std::fs::read(&saved).unwrap()).unwrap();
    assert_eq!(envelope["message_count"], 2);
    assert_eq!(envelope["messages"][0]["content"], "first");
    assert_eq!(envelope["messages"][1]["content"], "second");
}

#[tokio::test]
async fn rate_limited_page_is_retried_transparently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/10/messages"))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    serve_history(&server, json!([message(101, 1, "hello", json!([]))])).await;

    let exporter = ChatExporter::connect(config(&server), directory()).unwrap();
    let request = ExportRequest::channel(Snowflake(10)).with_format(ExportFormat::Txt);
    let report = exporter.export(&request).await.unwrap();

    assert!(report.is_complete());
    assert!(!report.rate_limited());
    assert_eq!(report.message_count, 1);
    let text = String::from_utf8(report.artifact.bytes).unwrap();
    assert!(text.contains("hello"));
}

#[tokio::test]
async fn bundled_export_contains_downloaded_attachments() {
    let server = MockServer::start().await;
    let attachment = json!([{
        "id": "50",
        "filename": "cat.png",
        "url": format!("{}/files/50/cat.png", server.uri()),
        "size": 4,
        "content_type": "image/png"
    }]);
    let missing = json!([{
        "id": "51",
        "filename": "notes.txt",
        "url": format!("{}/files/51/notes.txt", server.uri()),
        "size": 9,
        "content_type": "text/plain"
    }]);
    serve_history(
        &server,
        json!([
            message(102, 5, "notes", missing),
            message(101, 1, "look", attachment),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/50/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"meow".to_vec()))
        .mount(&server)
        .await;

    let exporter = ChatExporter::connect(config(&server), directory()).unwrap();
    let request = ExportRequest::channel(Snowflake(10))
        .with_format(ExportFormat::Html)
        .with_include(IncludeFlags {
            attachments: true,
            ..IncludeFlags::default()
        });
    let report = exporter.export(&request).await.unwrap();

    assert_eq!(report.attachments_succeeded, 1);
    assert_eq!(report.attachments_failed, 1);
    assert!(!report.packaging_failed);
    assert!(report.artifact.filename.ends_with("-with-attachments.zip"));
    assert!(report.status.contains("1 attachment(s) could not be downloaded"));

    let mut archive = zip::ZipArchive::new(Cursor::new(report.artifact.bytes)).unwrap();
    let mut cat = Vec::new();
    archive
        .by_name("attachments/cat.png")
        .unwrap()
        .read_to_end(&mut cat)
        .unwrap();
    assert_eq!(cat, b"meow");
    assert!(archive.by_name("attachments/notes.txt").is_err());

    let html_name = archive
        .file_names()
        .find(|name| name.ends_with(".html"))
        .map(str::to_string)
        .unwrap();
    let mut html = String::new();
    archive
        .by_name(&html_name)
        .unwrap()
        .read_to_string(&mut html)
        .unwrap();
    assert!(html.contains("attachments/cat.png"));
    assert!(html.contains("(not downloaded)"));
}

#[tokio::test]
async fn unknown_channel_stops_with_partial_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/10/messages"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let exporter = ChatExporter::connect(config(&server), directory()).unwrap();
    let report = exporter
        .export(&ExportRequest::channel(Snowflake(10)).with_format(ExportFormat::Csv))
        .await
        .unwrap();

    assert_eq!(report.message_count, 0);
    assert!(!report.is_complete());
    assert!(report.status.starts_with("Export failed"));
}
