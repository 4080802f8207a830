//! Search client HTTP contract and interactive session tests

use httpmock::prelude::*;
use index_preflight::search::{SearchClient, SearchError, SearchRequest, run_session};
use serde_json::json;
use std::time::Duration;

fn client(server: &MockServer) -> SearchClient {
    SearchClient::new(&server.base_url(), &server.base_url(), Duration::from_secs(5)).unwrap()
}

async fn mock_collections(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections");
            then.status(200).json_body(json!({
                "result": { "collections": [{ "name": "repo" }, { "name": "archive" }] },
                "status": "ok",
                "time": 0.0001
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/repo");
            then.status(200).json_body(json!({
                "result": { "status": "green", "points_count": 1234, "vectors_count": 1234 },
                "status": "ok"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/archive");
            then.status(500).body("unavailable");
        })
        .await;
}

async fn mock_embedding(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({
                "object": "list",
                "data": [{ "object": "embedding", "embedding": [0.1, 0.2, 0.3], "index": 0 }],
                "model": "jina-code-embeddings"
            }));
        })
        .await;
}

#[tokio::test]
async fn test_list_collections_with_counts() {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;

    let collections = client(&server).list_collections().await.unwrap();

    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].name, "archive");
    assert_eq!(collections[0].points_count, None);
    assert_eq!(collections[1].name, "repo");
    assert_eq!(collections[1].points_count, Some(1234));
}

#[tokio::test]
async fn test_list_collections_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections");
            then.status(503).body("db down");
        })
        .await;

    let err = client(&server).list_collections().await.unwrap_err();
    match err {
        SearchError::Introspection { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "db down");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_embed_returns_first_vector() {
    let server = MockServer::start_async().await;
    mock_embedding(&server).await;

    let vector = client(&server).embed("parse tokens").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn test_embed_error_carries_status_and_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(500).body("Embedder Failed");
        })
        .await;

    let err = client(&server).embed("q").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Embedding request failed with status 500: Embedder Failed"
    );
}

#[tokio::test]
async fn test_embed_empty_data() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({ "data": [] }));
        })
        .await;

    let err = client(&server).embed("q").await.unwrap_err();
    assert!(matches!(err, SearchError::EmptyEmbedding));
}

#[tokio::test]
async fn test_search_parses_hits() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/collections/repo/points/search");
            then.status(200).json_body(json!({
                "result": [
                    {
                        "id": 1,
                        "score": 0.91234,
                        "payload": {
                            "filePath": "src/parser.rs",
                            "startLine": 1,
                            "endLine": 20,
                            "codeChunk": "fn parse() {}"
                        }
                    },
                    { "id": 2, "score": 0.5, "payload": { "filePath": "src/lexer.rs" } }
                ],
                "status": "ok"
            }));
        })
        .await;

    let vector = [0.1f32, 0.2];
    let hits = client(&server)
        .search(&SearchRequest {
            collection: "repo",
            vector: &vector,
            limit: 5,
            file_path: None,
        })
        .await
        .unwrap();

    search.assert_async().await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].payload.file_path.as_deref(), Some("src/parser.rs"));
    assert_eq!(hits[1].payload.start_line, None);
}

#[tokio::test]
async fn test_search_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/collections/repo/points/search");
            then.status(502).body("Qdrant Failed");
        })
        .await;

    let vector = [0.1f32];
    let err = client(&server)
        .search(&SearchRequest {
            collection: "repo",
            vector: &vector,
            limit: 5,
            file_path: Some("src/main.rs"),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::SearchRequest { status: 502, .. }));
}

#[tokio::test]
async fn test_session_runs_query_and_quits() {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;
    mock_embedding(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/collections/repo/points/search");
            then.status(200).json_body(json!({
                "result": [{
                    "id": 1,
                    "score": 0.91234,
                    "payload": {
                        "filePath": "src/parser.rs",
                        "startLine": 1,
                        "endLine": 20,
                        "codeChunk": "fn parse() {}"
                    }
                }]
            }));
        })
        .await;

    // collection by name, default limit, no filter, one blank query, one real query
    let input: &[u8] = b"repo\n\n\n\nfind the parser\nQUIT\nnever read\n";
    let mut output = Vec::new();

    run_session(&client(&server), tokio::io::BufReader::new(input), &mut output)
        .await
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("1. archive (points unknown)"));
    assert!(output.contains("2. repo (1234 points)"));
    assert!(output.contains("Searching 'repo' (limit 5)"));
    assert!(output.contains("[1] score 0.9123  src/parser.rs:1-20"));
    assert!(output.contains("    fn parse() {}"));
    assert!(output.trim_end().ends_with("Bye."));
}

#[tokio::test]
async fn test_session_continues_after_failed_query() {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(500).body("Embedder Failed");
        })
        .await;

    let input: &[u8] = b"2\n3\nsrc/lib.rs\nfirst\nsecond\nexit\n";
    let mut output = Vec::new();

    run_session(&client(&server), tokio::io::BufReader::new(input), &mut output)
        .await
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("Searching 'repo' (limit 3)"));
    assert_eq!(
        output
            .matches("Error: Embedding request failed with status 500")
            .count(),
        2
    );
    assert!(output.contains("Bye."));
}

#[tokio::test]
async fn test_session_reprompts_on_bad_answers_and_ends_on_eof() {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;

    let input: &[u8] = b"7\nrepo\n0\n";
    let mut output = Vec::new();

    run_session(&client(&server), tokio::io::BufReader::new(input), &mut output)
        .await
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("Unknown collection '7'"));
    assert!(output.contains("Limit must be a positive number"));
    assert!(!output.contains("Searching"));
}

#[tokio::test]
async fn test_session_without_collections() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections");
            then.status(200)
                .json_body(json!({ "result": { "collections": [] }, "status": "ok" }));
        })
        .await;

    let mut output = Vec::new();
    run_session(&client(&server), tokio::io::BufReader::new(&b""[..]), &mut output)
        .await
        .unwrap();

    assert!(String::from_utf8(output).unwrap().contains("No collections found"));
}
