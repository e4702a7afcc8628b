//! Discogs database search
//!
//! Endpoint: `GET /database/search?type=release&artist=..&release_title=..`
//! with `Authorization: Discogs token=...`.
//!
//! Discogs lists individual releases (pressings); the master id groups
//! them. The search response carries no master year, so the earliest year
//! seen for a master within the response stands in as the group year.

use super::http::{build_http_client, decode_json, fetch_body};
use super::{year_prefix, SourceClient};
use crate::config::ProviderSettings;
use crate::error::{ProviderError, SyncError, SyncResult};
use crate::types::{AlbumQuery, CandidateRelease, Provider, ReleaseType};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

const PER_PAGE: &str = "25";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    /// "Artist - Title"
    title: String,
    year: Option<YearValue>,
    country: Option<String>,
    #[serde(default)]
    format: Vec<String>,
    master_id: Option<u64>,
}

/// Discogs reports years as strings, occasionally as numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YearValue {
    Number(i32),
    Text(String),
}

impl YearValue {
    fn year(&self) -> Option<i32> {
        match self {
            YearValue::Number(n) => Some(*n),
            YearValue::Text(s) => year_prefix(s),
        }
    }
}

pub struct DiscogsClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscogsClient {
    pub fn new(settings: &ProviderSettings) -> SyncResult<Self> {
        let token = settings
            .token
            .clone()
            .ok_or_else(|| SyncError::Config("Discogs requires providers.discogs.token".to_string()))?;
        Ok(Self {
            client: build_http_client(settings)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl SourceClient for DiscogsClient {
    fn provider(&self) -> Provider {
        Provider::Discogs
    }

    async fn query(&self, query: &AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError> {
        let url = format!("{}/database/search", self.base_url);
        let mut params = vec![
            ("type", "release"),
            ("release_title", query.album.as_str()),
            ("per_page", PER_PAGE),
        ];
        if query.has_artist() {
            params.push(("artist", query.artist.as_str()));
        }
        tracing::debug!(artist = %query.artist, album = %query.album, "Querying Discogs");

        let request = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Discogs token={}", self.token))
            .query(&params);
        let body = fetch_body(request).await?;
        parse_response(&body)
    }
}

/// Convert a search response body into candidates
pub fn parse_response(body: &str) -> Result<Vec<CandidateRelease>, ProviderError> {
    let response: SearchResponse = decode_json(body)?;

    let mut earliest_by_master: HashMap<u64, i32> = HashMap::new();
    for result in &response.results {
        if let (Some(master), Some(year)) = (master_of(result), result.year.as_ref().and_then(YearValue::year)) {
            earliest_by_master
                .entry(master)
                .and_modify(|y| *y = (*y).min(year))
                .or_insert(year);
        }
    }

    let candidates = response
        .results
        .into_iter()
        .filter_map(|result| {
            let year = result.year.as_ref().and_then(YearValue::year)?;
            let (artist, album) = split_title(&result.title);
            let master = master_of(&result);

            let formats: Vec<String> = result.format.iter().map(|f| f.to_ascii_lowercase()).collect();
            let has = |label: &str| formats.iter().any(|f| f == label);

            let mut candidate = CandidateRelease::new(Provider::Discogs, artist, album, year);
            candidate.release_type = release_type(&formats);
            candidate.is_bootleg = has("unofficial release");
            candidate.is_official = !candidate.is_bootleg;
            candidate.is_reissue = has("reissue") || has("repress") || has("remastered");
            candidate.release_group_id = master.map(|m| m.to_string());
            candidate.release_group_year = master.and_then(|m| earliest_by_master.get(&m).copied());
            candidate.country = result.country.as_deref().and_then(country_code);
            Some(candidate)
        })
        .collect();
    Ok(candidates)
}

fn master_of(result: &SearchResult) -> Option<u64> {
    result.master_id.filter(|id| *id != 0)
}

/// "Artist - Title" → (artist, title); titles without a separator keep an empty artist
fn split_title(title: &str) -> (String, String) {
    match title.split_once(" - ") {
        Some((artist, album)) => (artist.trim().to_string(), album.trim().to_string()),
        None => (String::new(), title.trim().to_string()),
    }
}

fn release_type(formats: &[String]) -> ReleaseType {
    for label in ["compilation", "live", "soundtrack", "ep", "single", "album", "lp"] {
        if formats.iter().any(|f| f == label) {
            return ReleaseType::from_provider_label(label);
        }
    }
    if formats.is_empty() {
        ReleaseType::Unknown
    } else {
        ReleaseType::Other
    }
}

/// Discogs uses country names, plus a few regions
fn country_code(name: &str) -> Option<String> {
    let code = match name {
        "US" => "US",
        "UK" => "GB",
        "Europe" => "XE",
        "Worldwide" => "XW",
        "Japan" => "JP",
        "Germany" => "DE",
        "France" => "FR",
        "Canada" => "CA",
        "Australia" => "AU",
        _ => return None,
    };
    Some(code.to_string())
}
