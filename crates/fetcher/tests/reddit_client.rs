//! RedditClient against a local stand-in for the OAuth and listing endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use newswire_core::config::RedditConfig;
use newswire_core::TargetBoards;
use newswire_fetcher::{FetchError, PostSource, RedditClient};

#[derive(Default)]
struct Upstream {
    tokens_issued: AtomicUsize,
    /// Reject this many listing calls with 401 before serving.
    reject_next: AtomicUsize,
    last_boards: std::sync::Mutex<String>,
}

async fn issue_token(State(up): State<Arc<Upstream>>, headers: HeaderMap) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !auth.starts_with("Basic ") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"})));
    }
    let n = up.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("token-{n}"),
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "*"
        })),
    )
}

async fn listing(
    State(up): State<Arc<Upstream>>,
    Path(boards): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    *up.last_boards.lock().unwrap() = boards;
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let rejected = up
        .reject_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if rejected || !auth.starts_with("Bearer token-") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "kind": "Listing",
            "data": {"children": [
                {"kind": "t3", "data": {
                    "id": "abc", "title": "Treaty signed", "selftext": "",
                    "subreddit": "news", "score": 10,
                    "url": "https://example.com/abc", "created_utc": 1.7e9
                }}
            ]}
        })),
    )
}

async fn spawn_upstream(up: Arc<Upstream>) -> String {
    let app = Router::new()
        .route("/api/v1/access_token", post(issue_token))
        .route("/r/{boards}/new", get(listing))
        .with_state(up);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str) -> RedditClient {
    let config = RedditConfig {
        client_id: "id".into(),
        client_secret: "secret".into(),
        username: "bot".into(),
        password: "hunter2".into(),
        ..RedditConfig::default()
    };
    RedditClient::with_endpoints(&config, format!("{base}/api/v1/access_token"), base).unwrap()
}

#[tokio::test]
async fn fetches_listing_with_cached_token() {
    let up = Arc::new(Upstream::default());
    let base = spawn_upstream(up.clone()).await;
    let client = client(&base);
    let boards = TargetBoards::default();

    let posts = client.fetch_new(&boards).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, "abc");
    assert_eq!(posts[0].subreddit, "news");

    client.fetch_new(&boards).await.unwrap();
    assert_eq!(up.tokens_issued.load(Ordering::SeqCst), 1);
    assert_eq!(*up.last_boards.lock().unwrap(), boards.query());
}

#[tokio::test]
async fn unauthorized_listing_forces_reauth() {
    let up = Arc::new(Upstream::default());
    let base = spawn_upstream(up.clone()).await;
    let client = client(&base);
    let boards = TargetBoards::default();

    up.reject_next.store(1, Ordering::SeqCst);
    assert!(matches!(
        client.fetch_new(&boards).await,
        Err(FetchError::Unauthorized)
    ));

    let posts = client.fetch_new(&boards).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(up.tokens_issued.load(Ordering::SeqCst), 2);
}
