//! Upstream forum client: OAuth password grant plus the `new` listing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use newswire_core::config::RedditConfig;
use newswire_core::{Submission, TargetBoards};

use crate::error::FetchError;
use crate::PostSource;

pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const API_BASE: &str = "https://oauth.reddit.com";

/// Refresh the bearer token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Link,
}

#[derive(Debug, Deserialize)]
struct Link {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    created_utc: f64,
}

impl From<Link> for Submission {
    fn from(link: Link) -> Self {
        let score = link.score.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        Submission::new(
            link.id,
            link.title,
            link.selftext,
            link.subreddit,
            score,
            link.url,
            link.created_utc,
        )
    }
}

/// Decode a `/new` listing body into submissions, newest first as served.
pub fn parse_listing(body: &[u8]) -> Result<Vec<Submission>, FetchError> {
    let listing: Listing = serde_json::from_slice(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| child.data.into())
        .collect())
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// Authenticated client for the forum's OAuth API.
#[derive(Debug)]
pub struct RedditClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    page_size: u32,
    token_url: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(config: &RedditConfig) -> Result<Self, FetchError> {
        Self::with_endpoints(config, TOKEN_URL, API_BASE)
    }

    /// Point the client at alternative token and API endpoints.
    pub fn with_endpoints(
        config: &RedditConfig,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            page_size: config.page_size,
            token_url: token_url.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    /// Cached bearer token, fetching a fresh one when missing or near expiry.
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken, FetchError> {
        debug!(username = %self.username, "requesting access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let parsed: TokenResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(FetchError::Auth(error));
        }
        let value = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::Auth("token response had no access_token".into()))?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3600));
        info!(expires_in_secs = lifetime.as_secs(), "obtained access token");
        Ok(AccessToken {
            value,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Latest submissions across `boards`, one page.
    pub async fn new_posts(&self, boards: &TargetBoards) -> Result<Vec<Submission>, FetchError> {
        let token = self.access_token().await?;
        let url = format!("{}/r/{}/new", self.api_base, boards.query());

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", self.page_size.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("access token rejected, will re-authenticate");
            self.invalidate_token().await;
            return Err(FetchError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        parse_listing(&body)
    }
}

#[async_trait]
impl PostSource for RedditClient {
    async fn fetch_new(&self, boards: &TargetBoards) -> Result<Vec<Submission>, FetchError> {
        self.new_posts(boards).await
    }
}
