//! Integration tests for `600 URI Acquire` handling.

use std::sync::Arc;

use apt_transport_artifact_registry::credentials::CredentialSource;
use apt_transport_artifact_registry::fetch::download::FileDownloader;
use apt_transport_artifact_registry::fetch::FetchRequest;
use apt_transport_artifact_registry::protocol::code;

use super::test_helpers::{
    acquire, codes, run_script, FakeConnector, FakeDownloader, FakeHttpClient, Reply,
};

const URI: &str = "ar+https://us-apt.pkg.dev/projects/p/r/dists/stable/InRelease";
const URL: &str = "https://us-apt.pkg.dev/projects/p/r/dists/stable/InRelease";

// ── Fetched ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ok_response_sends_start_then_done() {
    let client = FakeHttpClient::new(Reply::status(200));
    let downloader = FakeDownloader::new();
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(client.clone()),
        downloader.clone(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(
        codes(&out),
        [code::CAPABILITIES, code::URI_START, code::URI_DONE]
    );

    let start = &out[1];
    assert_eq!(start.get("URI"), Some(URI));
    assert_eq!(start.get("Size"), Some("200"));
    assert_eq!(start.get("Last-Modified"), Some("whenever"));
    assert_eq!(start.get("Resume-Point"), Some("0"));

    let done = &out[2];
    assert_eq!(done.get("URI"), Some(URI));
    assert_eq!(done.get("Filename"), Some("/tmp/a"));
    assert_eq!(done.get("Size"), Some("200"));
    assert_eq!(done.get("Last-Modified"), Some("whenever"));
    assert_eq!(done.get("MD5-Hash"), Some("ABCDEFGHI"));
    assert_eq!(done.get("IMS-Hit"), None);

    assert_eq!(
        client.requests(),
        [FetchRequest {
            url: URL.into(),
            if_modified_since: None,
        }]
    );
    assert_eq!(downloader.paths(), [std::path::PathBuf::from("/tmp/a")]);
}

#[tokio::test]
async fn last_modified_is_forwarded_as_if_modified_since() {
    let client = FakeHttpClient::new(Reply::status(200));
    let script = format!(
        "600 URI Acquire\nURI: {URI}\nFilename: /tmp/a\nLast-Modified: Tue, 01 Jun 2021 00:00:00 GMT\n\n"
    );
    let (outcome, _) = run_script(
        &script,
        FakeConnector::new(client.clone()),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, URL);
    assert_eq!(
        requests[0].if_modified_since.as_deref(),
        Some("Tue, 01 Jun 2021 00:00:00 GMT")
    );
}

#[tokio::test]
async fn missing_content_length_uses_bytes_written() {
    let client = FakeHttpClient::new(Reply::Status {
        status: 200,
        content_length: None,
        last_modified: None,
    });
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(client),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(out[1].code(), code::URI_START);
    assert_eq!(out[1].get("Size"), None);
    assert_eq!(out[1].get("Last-Modified"), None);
    assert_eq!(out[2].code(), code::URI_DONE);
    assert_eq!(out[2].get("Size"), Some("9"));
}

/// Real file download: the reported hashes are those of the body on disk.
#[tokio::test]
async fn file_downloader_reports_body_hashes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("InRelease");
    let filename = path.to_str().expect("utf-8 temp path");

    let client = FakeHttpClient::new(Reply::Status {
        status: 200,
        content_length: Some("11"),
        last_modified: Some("whenever"),
    });
    let (outcome, out) = run_script(
        &acquire(URI, filename),
        FakeConnector::new(client),
        Arc::new(FileDownloader),
    )
    .await;

    outcome.unwrap();
    let done = &out[2];
    assert_eq!(done.code(), code::URI_DONE);
    assert_eq!(done.get("Size"), Some("11"));
    assert_eq!(done.get("MD5-Hash"), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
    assert_eq!(
        done.get("SHA256-Hash"),
        Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
}

// ── Not modified ────────────────────────────────────────────────────────────

#[tokio::test]
async fn not_modified_sends_only_ims_hit() {
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(FakeHttpClient::new(Reply::status(304))),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(codes(&out), [code::CAPABILITIES, code::URI_DONE]);
    let done = &out[1];
    assert_eq!(done.get("IMS-Hit"), Some("true"));
    assert_eq!(done.get("Filename"), Some("/tmp/a"));
    assert_eq!(done.get("Last-Modified"), Some("whenever"));
    assert_eq!(done.get("Size"), None);
    assert_eq!(done.get("MD5-Hash"), None);
}

#[tokio::test]
async fn not_modified_without_header_echoes_request_date() {
    let client = FakeHttpClient::new(Reply::Status {
        status: 304,
        content_length: None,
        last_modified: None,
    });
    let script = format!(
        "600 URI Acquire\nURI: {URI}\nFilename: /tmp/a\nLast-Modified: Tue, 01 Jun 2021 00:00:00 GMT\n\n"
    );
    let (outcome, out) = run_script(&script, FakeConnector::new(client), FakeDownloader::new()).await;

    outcome.unwrap();
    assert_eq!(
        out[1].get("Last-Modified"),
        Some("Tue, 01 Jun 2021 00:00:00 GMT")
    );
}

// ── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unexpected_status_is_a_uri_failure() {
    let downloader = FakeDownloader::new();
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(FakeHttpClient::new(Reply::status(404))),
        downloader.clone(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(codes(&out), [code::CAPABILITIES, code::URI_FAILURE]);
    assert_eq!(out[1].get("URI"), Some(URI));
    assert_eq!(out[1].get("Message"), Some("Error downloading: code 404"));
    assert!(downloader.paths().is_empty(), "body of a 404 is not saved");
}

#[tokio::test]
async fn transport_error_is_a_uri_failure() {
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(FakeHttpClient::new(Reply::Fail("connection refused"))),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(codes(&out), [code::CAPABILITIES, code::URI_FAILURE]);
    assert_eq!(out[1].get("Message"), Some("http: connection refused"));
}

/// URI Start has already gone out when the download fails.
#[tokio::test]
async fn download_failure_follows_uri_start() {
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(FakeHttpClient::new(Reply::status(200))),
        FakeDownloader::failing(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(
        codes(&out),
        [code::CAPABILITIES, code::URI_START, code::URI_FAILURE]
    );
    assert_eq!(
        out[2].get("Message"),
        Some("download: write to /tmp/a failed: disk full")
    );
}

#[tokio::test]
async fn missing_uri_is_a_general_failure() {
    let connector = FakeConnector::new(FakeHttpClient::new(Reply::status(200)));
    let (outcome, out) = run_script(
        "600 URI Acquire\nFilename: /tmp/a\n\n",
        connector.clone(),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(codes(&out), [code::CAPABILITIES, code::GENERAL_FAILURE]);
    assert_eq!(
        out[1].get("Message"),
        Some("No URI provided in Acquire message")
    );
    assert_eq!(connector.calls(), 0);
}

#[tokio::test]
async fn missing_filename_is_a_uri_failure() {
    let connector = FakeConnector::new(FakeHttpClient::new(Reply::status(200)));
    let (outcome, out) = run_script(
        &format!("600 URI Acquire\nURI: {URI}\n\n"),
        connector.clone(),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(codes(&out), [code::CAPABILITIES, code::URI_FAILURE]);
    assert_eq!(out[1].get("URI"), Some(URI));
    assert_eq!(
        out[1].get("Message"),
        Some("No filename provided in Acquire message")
    );
    assert_eq!(connector.calls(), 0);
}

/// Failing to obtain credentials fails the request but not the process.
#[tokio::test]
async fn credential_failure_is_a_uri_failure_per_request() {
    let connector = FakeConnector::failing("no default credentials found");
    let script = format!("{}{}", acquire(URI, "/tmp/a"), acquire(URI, "/tmp/b"));
    let (outcome, out) = run_script(&script, connector.clone(), FakeDownloader::new()).await;

    outcome.unwrap();
    assert_eq!(
        codes(&out),
        [code::CAPABILITIES, code::URI_FAILURE, code::URI_FAILURE]
    );
    assert_eq!(
        out[1].get("Message"),
        Some("credentials: no default credentials found")
    );
    assert_eq!(connector.calls(), 2, "resolution is retried on the next request");
}

// ── Client lifetime ─────────────────────────────────────────────────────────

#[tokio::test]
async fn client_is_created_once_and_reused() {
    let client = FakeHttpClient::new(Reply::status(304));
    let connector = FakeConnector::new(client.clone());
    let script = format!("{}{}", acquire(URI, "/tmp/a"), acquire(URI, "/tmp/b"));
    let (outcome, out) = run_script(&script, connector.clone(), FakeDownloader::new()).await;

    outcome.unwrap();
    assert_eq!(
        codes(&out),
        [code::CAPABILITIES, code::URI_DONE, code::URI_DONE]
    );
    assert_eq!(connector.calls(), 1);
    assert_eq!(connector.sources(), [CredentialSource::Ambient]);
    assert_eq!(client.requests().len(), 2);
}

// ── Debug logging ───────────────────────────────────────────────────────────

#[tokio::test]
async fn debug_enabled_emits_log_messages() {
    let script = format!(
        "601 Configuration\nConfig-Item: Debug::Acquire::gar=true\n\n{}",
        acquire(URI, "/tmp/a")
    );
    let (outcome, out) = run_script(
        &script,
        FakeConnector::new(FakeHttpClient::new(Reply::status(200))),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert_eq!(
        codes(&out),
        [
            code::CAPABILITIES,
            code::LOG,
            code::LOG,
            code::LOG,
            code::URI_START,
            code::URI_DONE,
        ]
    );
    let requesting = format!("Requesting {URL}");
    let logs: Vec<_> = out[1..4].iter().filter_map(|m| m.get("Message")).collect();
    assert_eq!(
        logs,
        [
            "Using application default credentials",
            requesting.as_str(),
            "Server returned 200",
        ]
    );
}

#[tokio::test]
async fn debug_disabled_emits_no_log_messages() {
    let (outcome, out) = run_script(
        &acquire(URI, "/tmp/a"),
        FakeConnector::new(FakeHttpClient::new(Reply::status(200))),
        FakeDownloader::new(),
    )
    .await;

    outcome.unwrap();
    assert!(out.iter().all(|m| m.code() != code::LOG));
}
