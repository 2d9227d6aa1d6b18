//! Minimal MediaWiki API client: page wikitext, full text search and file URLs.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::WikiError;

/// One hit of a full text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub pageid: u64,
    #[serde(default)]
    pub snippet: String,
}

/// Client for a wiki's `api.php` endpoint.
#[derive(Debug, Clone)]
pub struct WikiClient {
    api_url: Url,
    client: reqwest::Client,
}

impl WikiClient {
    /// Creates a client for the given `api.php` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: Url) -> Result<Self, WikiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wikipoi/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { api_url, client })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// The `index.php` URL next to `api.php`, used for file links.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be joined.
    pub fn index_url(&self) -> Result<Url, WikiError> {
        Ok(self.api_url.join("index.php")?)
    }

    /// Fetches the raw wikitext of `page`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The request fails or the response is not JSON
    /// * The wiki reports an error for the page, e.g. because it does not exist
    /// * The response carries no wikitext string
    pub async fn fetch_wikitext(&self, page: &str) -> Result<String, WikiError> {
        info!("Fetching wiki page '{page}'");
        let body: Value = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("action", "parse"),
                ("page", page),
                ("prop", "wikitext"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        wikitext_from_response(page, &body)
    }

    /// Runs a full text search over all pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has an unexpected shape.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, WikiError> {
        debug!("Searching wiki for '{query}'");
        let body: Value = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srwhat", "text"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        search_hits_from_response(query, &body)
    }
}

/// Pulls `parse.wikitext["*"]` out of an `action=parse` response.
///
/// # Errors
///
/// Returns [`WikiError::PageNotFound`] if the response carries an `error` object and
/// [`WikiError::UnexpectedResponse`] if the wikitext is missing or not a string.
pub fn wikitext_from_response(page: &str, body: &Value) -> Result<String, WikiError> {
    if let Some(error) = body.get("error") {
        let info = error
            .get("info")
            .or_else(|| error.get("code"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(WikiError::PageNotFound {
            page: page.to_owned(),
            info: info.to_owned(),
        });
    }

    body.pointer("/parse/wikitext/*")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| WikiError::UnexpectedResponse {
            page: page.to_owned(),
            details: "no wikitext string in response".to_owned(),
        })
}

/// Pulls `query.search` out of an `action=query&list=search` response.
///
/// # Errors
///
/// Returns [`WikiError::UnexpectedResponse`] if the hit list is missing or malformed.
pub fn search_hits_from_response(query: &str, body: &Value) -> Result<Vec<SearchHit>, WikiError> {
    let hits = body
        .pointer("/query/search")
        .cloned()
        .ok_or_else(|| WikiError::UnexpectedResponse {
            page: query.to_owned(),
            details: "no search results in response".to_owned(),
        })?;

    serde_json::from_value(hits).map_err(|e| WikiError::UnexpectedResponse {
        page: query.to_owned(),
        details: e.to_string(),
    })
}

/// Download URL of an uploaded file, via `Special:FilePath`.
pub fn file_url(index_url: &Url, name: &str) -> Url {
    let mut url = index_url.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("title", &format!("Special:FilePath/{name}"));
    url
}
