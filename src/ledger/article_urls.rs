use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ARTICLE_URLS_FILE: &str = "article_urls.json";

/// One value of a bucket's `article_urls.json`. Older runs stored the bare
/// URL; newer ones store an object with the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArticleUrlEntry {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(
            default,
            deserialize_with = "crate::domain::timestamp::deserialize",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ArticleUrlEntry {
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Detailed { url, .. } => url,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Url(_) => None,
            Self::Detailed { status, .. } => status.as_deref(),
        }
    }
}

/// Article number → source URL for one date bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleUrls {
    entries: BTreeMap<String, ArticleUrlEntry>,
}

impl ArticleUrls {
    pub fn max_number(&self) -> Option<u64> {
        self.entries
            .keys()
            .filter_map(|k| k.trim().parse::<u64>().ok())
            .max()
    }

    pub fn get(&self, number: u64) -> Option<&ArticleUrlEntry> {
        self.entries.get(&number.to_string())
    }

    pub fn record(&mut self, number: u64, url: &str, status: &str, error: Option<String>) {
        self.entries.insert(
            number.to_string(),
            ArticleUrlEntry::Detailed {
                url: url.to_string(),
                status: Some(status.to_string()),
                timestamp: Some(Utc::now()),
                error,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
