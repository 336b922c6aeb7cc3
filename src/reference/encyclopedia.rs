//! Encyclopedia lookup for the predicted condition.
//!
//! Backed by the Wikipedia REST summary endpoint
//! (`/api/rest_v1/page/summary/{title}`). Callers go through
//! [`tumor_information`], which never fails: every lookup error becomes a
//! readable fallback sentence.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Sentences kept from the article summary.
pub const SUMMARY_SENTENCES: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Multiple articles match {0:?}")]
    Ambiguous(String),

    #[error("No article found for {0:?}")]
    NotFound(String),

    #[error("Cannot reach encyclopedia at {0}")]
    Connection(String),

    #[error("Encyclopedia returned status {status}")]
    Status { status: u16 },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed encyclopedia response: {0}")]
    ResponseParsing(String),
}

/// Short article summaries by title.
pub trait EncyclopediaLookup: Send + Sync {
    /// First `sentences` sentences of the article about `topic`.
    fn summary(&self, topic: &str, sentences: usize) -> Result<String, LookupError>;
}

/// Descriptive text about a predicted condition, or a fallback sentence.
pub fn tumor_information(lookup: &dyn EncyclopediaLookup, topic: &str) -> String {
    match lookup.summary(topic, SUMMARY_SENTENCES) {
        Ok(summary) => summary,
        Err(e) => {
            warn!(topic, error = %e, "Encyclopedia lookup failed, using fallback text");
            fallback_text(topic, &e)
        }
    }
}

/// User-facing text for a failed lookup.
pub fn fallback_text(topic: &str, error: &LookupError) -> String {
    match error {
        LookupError::Ambiguous(_) => {
            format!("Multiple results found for {topic}. Please specify further.")
        }
        LookupError::NotFound(_) => format!("No information found on Wikipedia for {topic}."),
        _ => format!("Information about {topic} is currently unavailable."),
    }
}

/// First `n` sentences of `text`.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or the end of
/// the text.
pub fn first_sentences(text: &str, n: usize) -> String {
    let text = text.trim();
    if n == 0 {
        return String::new();
    }

    let mut seen = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                seen += 1;
                if seen == n {
                    return text[..i + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}

// ═══════════════════════════════════════════════════════════
// Wikipedia client
// ═══════════════════════════════════════════════════════════

/// Response body of the REST summary endpoint (fields we read).
#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    extract: String,
}

/// Wikipedia REST client.
pub struct WikipediaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl WikipediaClient {
    /// `base_url` is the wiki root, e.g. `https://en.wikipedia.org`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("brainscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    fn summary_url(&self, topic: &str) -> Result<Url, LookupError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LookupError::HttpClient(format!("invalid base URL {}: {e}", self.base_url)))?;
        let title = topic.trim().replace(' ', "_");
        url.path_segments_mut()
            .map_err(|_| LookupError::HttpClient(format!("base URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary", title.as_str()]);
        Ok(url)
    }
}

impl EncyclopediaLookup for WikipediaClient {
    fn summary(&self, topic: &str, sentences: usize) -> Result<String, LookupError> {
        if topic.trim().is_empty() {
            return Err(LookupError::NotFound(topic.to_string()));
        }
        let url = self.summary_url(topic)?;

        let response = self.client.get(url).send().map_err(|e| {
            if e.is_connect() {
                LookupError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                LookupError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                LookupError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(topic.to_string()));
        }
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: SummaryResponse = response
            .json()
            .map_err(|e| LookupError::ResponseParsing(e.to_string()))?;

        if parsed.kind == "disambiguation" {
            return Err(LookupError::Ambiguous(topic.to_string()));
        }
        if parsed.extract.trim().is_empty() {
            return Err(LookupError::NotFound(topic.to_string()));
        }
        Ok(first_sentences(&parsed.extract, sentences))
    }
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

/// Mock lookup for testing: fixed outcome for every topic.
pub struct MockEncyclopedia {
    outcome: Result<String, LookupError>,
}

impl MockEncyclopedia {
    pub fn new(summary: &str) -> Self {
        Self {
            outcome: Ok(summary.to_string()),
        }
    }

    pub fn failing(error: LookupError) -> Self {
        Self {
            outcome: Err(error),
        }
    }
}

impl EncyclopediaLookup for MockEncyclopedia {
    fn summary(&self, _topic: &str, sentences: usize) -> Result<String, LookupError> {
        self.outcome
            .as_ref()
            .map(|s| first_sentences(s, sentences))
            .map_err(Clone::clone)
    }
}
