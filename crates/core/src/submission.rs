use serde::{Deserialize, Deserializer, Serialize};

/// A single top-level post from one of the target boards.
///
/// This is the only record that flows through the pipeline. The fetcher fills
/// the upstream fields; `topics` and `sentiment` stay empty until the enricher
/// has seen the post.
///
/// Serialized field names are lowercase. Decoding also accepts the capitalised
/// names older producers emitted (`ID`, `Title`, `CreatedAt`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(alias = "ID")]
    pub id: String,

    #[serde(alias = "Title")]
    pub title: String,

    /// Self-text of the post; empty for link posts.
    #[serde(default, alias = "Body")]
    pub body: String,

    #[serde(alias = "Subreddit")]
    pub subreddit: String,

    #[serde(default, alias = "Score")]
    pub score: i32,

    #[serde(default, alias = "URL")]
    pub url: String,

    /// Seconds since the Unix epoch.
    #[serde(default, alias = "CreatedAt")]
    pub created_at: f64,

    #[serde(default, alias = "Topics", deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,

    /// `-1.0` or `+1.0` once enriched, `0.0` before enrichment or when the
    /// sentiment model is unavailable.
    #[serde(default, alias = "Sentiment")]
    pub sentiment: f64,
}

impl Submission {
    /// Build an un-enriched submission as it arrives from upstream.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        subreddit: impl Into<String>,
        score: i32,
        url: impl Into<String>,
        created_at: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            subreddit: subreddit.into(),
            score,
            url: url.into(),
            created_at,
            topics: Vec::new(),
            sentiment: 0.0,
        }
    }

    /// Text fed to topic extraction and sentiment: the title, followed by the
    /// body when there is one.
    pub fn analysis_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body)
        }
    }

    /// Canonical JSON encoding used on the bus and on client sockets.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

fn null_as_empty<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}
