//! Title spelling correction through a search-suggestion service

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

/// Google's suggestion endpoint (Firefox JSON flavour)
pub const GOOGLE_SUGGEST_URL: &str = "https://suggestqueries.google.com/complete/search";

/// Produces a better-spelled version of a query, if one exists
#[async_trait]
pub trait TitleCorrector: Send + Sync {
    async fn suggest(&self, query: &str) -> Option<String>;
}

/// Suggestions from Google's autocomplete
#[derive(Debug, Clone)]
pub struct GoogleSuggest {
    client: Client,
    endpoint: String,
}

impl GoogleSuggest {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(client, GOOGLE_SUGGEST_URL)
    }

    pub fn with_endpoint(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    async fn fetch_suggestion(&self, query: &str) -> reqwest::Result<Option<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("client", "firefox"), ("q", query)])
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Suggestion service returned {}", response.status());
            return Ok(None);
        }

        // Response shape: ["query", ["suggestion", ...]]
        let data: Value = response.json().await?;
        Ok(data
            .get(1)
            .and_then(Value::as_array)
            .and_then(|suggestions| suggestions.first())
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string))
    }
}

#[async_trait]
impl TitleCorrector for GoogleSuggest {
    async fn suggest(&self, query: &str) -> Option<String> {
        match self.fetch_suggestion(query).await {
            Ok(suggestion) => suggestion,
            Err(e) => {
                warn!("Failed to fetch title suggestion: {}", e);
                None
            }
        }
    }
}

/// Outcome of correcting a title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    /// Raw suggestion, when one was used
    pub suggestion: Option<String>,
}

/// Upper-case the first letter of every word
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title-case the input, preferring a suggestion that differs from it
pub async fn autocorrect_title(corrector: &dyn TitleCorrector, input: &str) -> Correction {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Correction {
            original: input.to_string(),
            corrected: input.to_string(),
            suggestion: None,
        };
    }

    if let Some(suggestion) = corrector.suggest(trimmed).await {
        if suggestion.to_lowercase() != trimmed.to_lowercase() {
            return Correction {
                original: trimmed.to_string(),
                corrected: title_case(&suggestion),
                suggestion: Some(suggestion),
            };
        }
    }

    Correction {
        original: trimmed.to_string(),
        corrected: title_case(trimmed),
        suggestion: None,
    }
}
