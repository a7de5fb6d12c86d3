//! Two-class naive Bayes sentiment model over word counts.
//!
//! The trained counts ship inside the binary (`data/sentiment_model.json`) and
//! are parsed once by [`SentimentModel::restore`].

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::EnrichError;

static MODEL_JSON: &str = include_str!("../data/sentiment_model.json");

/// Model class for a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Negative = 0,
    Positive = 1,
}

impl Polarity {
    /// Collapse to the pipeline's score: class 0 is `-1.0`, anything else `+1.0`.
    pub fn score(self) -> f64 {
        match self {
            Polarity::Negative => -1.0,
            Polarity::Positive => 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    negative_docs: u64,
    positive_docs: u64,
    /// `[negative, positive]` occurrence counts per word.
    words: HashMap<String, [u64; 2]>,
}

#[derive(Debug, Clone)]
pub struct SentimentModel {
    log_prior: [f64; 2],
    log_likelihood: HashMap<String, [f64; 2]>,
}

impl SentimentModel {
    /// Load the bundled model.
    pub fn restore() -> Result<Self, EnrichError> {
        Self::from_json(MODEL_JSON)
    }

    pub fn from_json(raw: &str) -> Result<Self, EnrichError> {
        let file: ModelFile = serde_json::from_str(raw)?;
        if file.words.is_empty() {
            return Err(EnrichError::EmptyModel("no vocabulary"));
        }
        let docs = file.negative_docs + file.positive_docs;
        if file.negative_docs == 0 || file.positive_docs == 0 {
            return Err(EnrichError::EmptyModel("a class has no training documents"));
        }

        let vocab = file.words.len() as f64;
        let mut totals = [0u64; 2];
        for counts in file.words.values() {
            totals[0] += counts[0];
            totals[1] += counts[1];
        }

        // Laplace smoothing over the vocabulary.
        let log_likelihood = file
            .words
            .into_iter()
            .map(|(word, counts)| {
                let p = [0, 1].map(|c| ((counts[c] as f64 + 1.0) / (totals[c] as f64 + vocab)).ln());
                (word, p)
            })
            .collect();

        Ok(Self {
            log_prior: [
                (file.negative_docs as f64 / docs as f64).ln(),
                (file.positive_docs as f64 / docs as f64).ln(),
            ],
            log_likelihood,
        })
    }

    pub fn vocabulary_len(&self) -> usize {
        self.log_likelihood.len()
    }

    /// Most likely class for `text`. Words outside the vocabulary carry no
    /// evidence; ties go to [`Polarity::Negative`].
    pub fn classify(&self, text: &str) -> Polarity {
        let mut score = self.log_prior;
        for token in tokenize(text) {
            if let Some(p) = self.log_likelihood.get(token.as_str()) {
                score[0] += p[0];
                score[1] += p[1];
            }
        }
        if score[1] > score[0] {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
