//! Streaming Integration Tests
//!
//! Drives the HTTP router in-process to check byte-range semantics.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use vidshelf::{build_router, AppState, Library, LibraryOptions};

const FILE_SIZE: u32 = 500_000;

struct Fixture {
    _temp: TempDir,
    router: Router,
    data: Vec<u8>,
}

/// One scanned folder (f0) holding a patterned 500,000-byte clip.mp4
async fn setup() -> Fixture {
    let temp = TempDir::new().unwrap();
    let videos = temp.path().join("videos");
    std::fs::create_dir_all(&videos).unwrap();

    let data: Vec<u8> = (0..FILE_SIZE).map(|i| (i % 251) as u8).collect();
    std::fs::write(videos.join("clip.mp4"), &data).unwrap();
    std::fs::write(temp.path().join("secret.mp4"), b"outside").unwrap();

    let library = Library::open(&temp.path().join("home"), LibraryOptions::default())
        .await
        .unwrap();
    let view = library
        .registry
        .register(videos.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(view.folder.id.as_str(), "f0");

    Fixture {
        _temp: temp,
        router: build_router(Arc::new(AppState::new(library))),
        data,
    }
}

async fn get(router: &Router, uri: &str, range: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().uri(uri);
    if let Some(range) = range {
        builder = builder.header(RANGE, range);
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

fn header<'a>(response: &'a axum::response::Response, name: axum::http::HeaderName) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn test_full_file_without_range() {
    let fx = setup().await;
    let response = get(&fx.router, "/videos/f0::clip.mp4", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_LENGTH), "500000");
    assert_eq!(header(&response, CONTENT_TYPE), "video/mp4");
    assert_eq!(header(&response, ACCEPT_RANGES), "bytes");
    assert!(response.headers().get(CONTENT_RANGE).is_none());

    assert_eq!(body_bytes(response).await, fx.data);
}

#[tokio::test]
async fn test_partial_range() {
    let fx = setup().await;
    let response = get(&fx.router, "/videos/f0::clip.mp4", Some("bytes=100000-199999")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 100000-199999/500000");
    assert_eq!(header(&response, CONTENT_LENGTH), "100000");
    assert_eq!(header(&response, ACCEPT_RANGES), "bytes");

    assert_eq!(body_bytes(response).await, &fx.data[100_000..200_000]);
}

#[tokio::test]
async fn test_open_ended_and_suffix_ranges() {
    let fx = setup().await;

    let response = get(&fx.router, "/videos/f0::clip.mp4", Some("bytes=499990-")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 499990-499999/500000");
    assert_eq!(body_bytes(response).await, &fx.data[499_990..]);

    let response = get(&fx.router, "/videos/f0::clip.mp4", Some("bytes=-16")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_LENGTH), "16");
    assert_eq!(body_bytes(response).await, &fx.data[499_984..]);
}

#[tokio::test]
async fn test_concurrent_ranges_concatenate() {
    let fx = setup().await;

    let (first, second) = tokio::join!(
        get(&fx.router, "/videos/f0::clip.mp4", Some("bytes=0-1023")),
        get(&fx.router, "/videos/f0::clip.mp4", Some("bytes=1024-2047")),
    );
    assert_eq!(first.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(second.status(), StatusCode::PARTIAL_CONTENT);

    let (first, second) = tokio::join!(body_bytes(first), body_bytes(second));
    let mut joined = first;
    joined.extend(second);
    assert_eq!(joined, &fx.data[..2048]);
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let fx = setup().await;

    for range in ["bytes=500000-500001", "bytes=10-5", "bytes=0-500000"] {
        let response = get(&fx.router, "/videos/f0::clip.mp4", Some(range)).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
        assert_eq!(header(&response, CONTENT_RANGE), "bytes */500000");
    }
}

#[tokio::test]
async fn test_unsupported_range_is_ignored() {
    let fx = setup().await;
    let response = get(&fx.router, "/videos/f0::clip.mp4", Some("bytes=0-1,5-9")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_LENGTH), "500000");
}

#[tokio::test]
async fn test_head_has_headers_only() {
    let fx = setup().await;
    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/videos/f0::clip.mp4")
        .header(RANGE, "bytes=0-99")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_LENGTH), "100");
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 0-99/500000");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_unknown_and_escaping_addresses_are_not_found() {
    let fx = setup().await;

    for uri in [
        "/videos/f9::clip.mp4",
        "/videos/f0::missing.mp4",
        "/videos/no-delimiter",
        "/videos/f0::..%2Fsecret.mp4",
    ] {
        let response = get(&fx.router, uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");

        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_preview_of_scanned_video_is_the_video() {
    let fx = setup().await;

    let response = get(&fx.router, "/previews/f0::clip.mp4", Some("bytes=0-9")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(response).await, &fx.data[..10]);

    let response = get(&fx.router, "/thumbnails/f0::clip.mp4", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
