//! Post enrichment: keyword topics and a binary sentiment score.

pub mod error;
pub mod sentiment;
pub mod topics;

use tracing::{debug, error};

use newswire_core::Submission;

pub use error::EnrichError;
pub use sentiment::{Polarity, SentimentModel};
pub use topics::{extract_topics, STOP_WORDS};

/// Fills in `topics` and `sentiment` on a submission.
///
/// The sentiment model is loaded once at construction. If it fails to load,
/// every post scores `0.0` and processing carries on.
#[derive(Debug, Clone)]
pub struct Enricher {
    model: Option<SentimentModel>,
}

impl Enricher {
    pub fn new() -> Self {
        match SentimentModel::restore() {
            Ok(model) => {
                debug!(vocabulary = model.vocabulary_len(), "sentiment model loaded");
                Self::with_model(Some(model))
            }
            Err(e) => {
                error!(error = %e, "failed to initialise sentiment model, scoring posts as neutral");
                Self::with_model(None)
            }
        }
    }

    pub fn with_model(model: Option<SentimentModel>) -> Self {
        Self { model }
    }

    /// `-1.0` or `+1.0` from the model, `0.0` without one.
    pub fn sentiment(&self, text: &str) -> f64 {
        match &self.model {
            Some(model) => model.classify(&text.to_lowercase()).score(),
            None => 0.0,
        }
    }

    /// Overwrite the derived fields from the post's title and body.
    pub fn enrich(&self, post: &mut Submission) {
        let text = post.analysis_text();
        post.topics = extract_topics(&text);
        post.sentiment = self.sentiment(&text);
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str, body: &str) -> Submission {
        Submission::new("abc", title, body, "news", 10, "https://e.com/abc", 1.7e9)
    }

    #[test]
    fn happy_path_topics_and_sentiment() {
        let mut p = post("Treaty signed", "");
        Enricher::new().enrich(&mut p);
        assert_eq!(p.topics, vec!["Treaty", "Signed"]);
        assert!(p.sentiment == 1.0 || p.sentiment == -1.0);
    }

    #[test]
    fn body_joins_title() {
        let mut p = post("Senate", "approves budget");
        Enricher::new().enrich(&mut p);
        assert_eq!(p.topics, vec!["Senate", "Approves", "Budget"]);
    }

    #[test]
    fn enrichment_is_idempotent() {
        let enricher = Enricher::new();
        let mut once = post("Floods destroy villages", "Rescue teams arrive with relief");
        enricher.enrich(&mut once);
        let mut twice = once.clone();
        enricher.enrich(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_model_scores_neutral() {
        let mut p = post("Wonderful peace deal", "");
        Enricher::with_model(None).enrich(&mut p);
        assert_eq!(p.sentiment, 0.0);
        assert_eq!(p.topics, vec!["Wonderful", "Peace", "Deal"]);
    }
}
