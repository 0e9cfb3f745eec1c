//! Minimal Wikipedia client: search for page titles, fetch each page's
//! plain-text intro, and format the hits into one bounded summary.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::WikiConfig;

pub const NO_RESULT: &str = "No good Wikipedia Search Result was found";

const MAX_QUERY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub title: String,
    pub summary: String,
}

impl PageSummary {
    fn render(&self) -> String {
        format!("Page: {}\nSummary: {}", self.title, self.summary)
    }
}

pub struct WikipediaClient<'a> {
    client: &'a Client,
    cfg: &'a WikiConfig,
}

impl<'a> WikipediaClient<'a> {
    pub fn new(client: &'a Client, cfg: &'a WikiConfig) -> Self {
        Self { client, cfg }
    }

    /// Looks `query` up and returns at most `doc_chars_max` characters of
    /// formatted page summaries, or [`NO_RESULT`] when nothing matched.
    pub async fn run(&self, query: &str) -> Result<String> {
        let query = clip_chars(query.trim(), MAX_QUERY_CHARS);
        if query.is_empty() {
            return Ok(NO_RESULT.to_string());
        }

        let titles = self.search(query).await?;
        let mut pages = Vec::with_capacity(titles.len());
        for title in &titles {
            match self.summary(title).await? {
                Some(page) => pages.push(page),
                None => debug!(title = %title, "wikipedia page has no extract"),
            }
        }

        if pages.is_empty() {
            debug!(query = %query, "wikipedia lookup found nothing");
            return Ok(NO_RESULT.to_string());
        }

        let joined = pages
            .iter()
            .map(PageSummary::render)
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(clip_chars(&joined, self.cfg.doc_chars_max).to_string())
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let limit = self.cfg.top_k_results.to_string();
        let response: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("srprop", ""),
            ])
            .await
            .context("Wikipedia search failed")?;

        let titles: Vec<String> = response
            .query
            .map(|q| q.search)
            .unwrap_or_default()
            .into_iter()
            .take(self.cfg.top_k_results)
            .map(|hit| hit.title)
            .collect();
        debug!(query = %query, hits = titles.len(), "wikipedia search completed");
        Ok(titles)
    }

    async fn summary(&self, title: &str) -> Result<Option<PageSummary>> {
        let response: ExtractResponse = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await
            .with_context(|| format!("Failed to fetch Wikipedia summary for '{title}'"))?;

        Ok(response
            .query
            .into_iter()
            .flat_map(|q| q.pages.into_values())
            .find_map(|page| {
                let summary = page.extract?.trim().to_string();
                (!summary.is_empty()).then_some(PageSummary {
                    title: page.title,
                    summary,
                })
            }))
    }

    async fn get<T>(&self, params: &[(&str, &str)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .get(&self.cfg.api_url)
            .query(params)
            .query(&[("format", "json"), ("formatversion", "1")])
            .send()
            .await
            .map_err(|err| {
                warn!(api_url = %self.cfg.api_url, error = %err, "wikipedia request failed");
                anyhow!("Failed to reach Wikipedia at '{}': {}", self.cfg.api_url, err)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(api_url = %self.cfg.api_url, status = %status, "wikipedia returned non-success status");
            return Err(anyhow!("Wikipedia request failed with status {}", status));
        }

        response
            .json()
            .await
            .context("Failed to parse Wikipedia response")
    }
}

/// Cuts `text` to at most `max_chars` characters without splitting a char.
pub fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
