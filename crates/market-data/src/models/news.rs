use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A news item about an entity. The link is its identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub link: String,

    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NewsArticle {
    pub fn new(link: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            publisher: None,
            published_at: None,
            summary: None,
        }
    }

    /// Text handed to a sentiment scorer: title plus summary when present.
    pub fn scoring_text(&self) -> String {
        match &self.summary {
            Some(summary) if !summary.trim().is_empty() => format!("{}. {}", self.title, summary),
            _ => self.title.clone(),
        }
    }
}
