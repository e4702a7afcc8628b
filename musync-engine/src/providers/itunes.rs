//! iTunes Search API (album entity)
//!
//! Endpoint: `GET /search?term=..&entity=album&media=music`
//!
//! The store lists the currently sold edition, so `releaseDate` is often
//! a remaster date. Editions are flagged as reissues from their title.

use super::http::{build_http_client, decode_json, fetch_body};
use super::{year_prefix, SourceClient};
use crate::config::ProviderSettings;
use crate::error::{ProviderError, SyncResult};
use crate::types::{AlbumQuery, CandidateRelease, Provider, ReleaseType};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const SEARCH_LIMIT: &str = "25";

const REISSUE_MARKERS: [&str; 4] = ["remaster", "anniversary", "deluxe", "expanded"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Collection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Collection {
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    collection_name: String,
    collection_type: Option<String>,
    release_date: Option<String>,
    country: Option<String>,
    primary_genre_name: Option<String>,
}

pub struct ITunesClient {
    client: Client,
    base_url: String,
}

impl ITunesClient {
    pub fn new(settings: &ProviderSettings) -> SyncResult<Self> {
        Ok(Self {
            client: build_http_client(settings)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SourceClient for ITunesClient {
    fn provider(&self) -> Provider {
        Provider::ITunes
    }

    async fn query(&self, query: &AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let term = if query.has_artist() {
            format!("{} {}", query.artist, query.album)
        } else {
            query.album.clone()
        };
        tracing::debug!(term = %term, "Querying iTunes");

        let body = fetch_body(self.client.get(&url).query(&[
            ("term", term.as_str()),
            ("entity", "album"),
            ("media", "music"),
            ("limit", SEARCH_LIMIT),
        ]))
        .await?;
        parse_response(&body)
    }
}

/// Convert a search response body into candidates
pub fn parse_response(body: &str) -> Result<Vec<CandidateRelease>, ProviderError> {
    let response: SearchResponse = decode_json(body)?;

    let candidates = response
        .results
        .into_iter()
        .filter(|c| c.collection_type.as_deref().map_or(true, |t| t == "Album"))
        .filter_map(|collection| {
            let year = collection.release_date.as_deref().and_then(year_prefix)?;
            let (album, suffix_type) = strip_store_suffix(&collection.collection_name);
            let lowered = collection.collection_name.to_lowercase();

            let mut candidate = CandidateRelease::new(
                Provider::ITunes,
                collection.artist_name,
                album,
                year,
            );
            candidate.release_type = suffix_type.unwrap_or_else(|| {
                match collection.primary_genre_name.as_deref() {
                    Some("Soundtrack") => ReleaseType::Soundtrack,
                    _ if lowered.contains("greatest hits") || lowered.contains("best of") => {
                        ReleaseType::Compilation
                    }
                    _ if lowered.contains("(live") || lowered.contains("[live") => ReleaseType::Live,
                    _ => ReleaseType::Album,
                }
            });
            candidate.is_official = true;
            candidate.is_reissue = REISSUE_MARKERS.iter().any(|m| lowered.contains(m));
            candidate.country = collection.country.as_deref().and_then(country_code);
            Some(candidate)
        })
        .collect();
    Ok(candidates)
}

/// The store appends " - Single" / " - EP" to collection names
fn strip_store_suffix(name: &str) -> (String, Option<ReleaseType>) {
    if let Some(base) = name.strip_suffix(" - Single") {
        (base.to_string(), Some(ReleaseType::Single))
    } else if let Some(base) = name.strip_suffix(" - EP") {
        (base.to_string(), Some(ReleaseType::Ep))
    } else {
        (name.to_string(), None)
    }
}

/// Storefront ISO 3166 alpha-3 → alpha-2 for the markets that matter to scoring
fn country_code(alpha3: &str) -> Option<String> {
    let code = match alpha3 {
        "USA" => "US",
        "GBR" => "GB",
        "JPN" => "JP",
        "DEU" => "DE",
        "FRA" => "FR",
        "CAN" => "CA",
        "AUS" => "AU",
        _ => return None,
    };
    Some(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "resultCount": 4,
        "results": [
            {
                "wrapperType": "collection",
                "collectionType": "Album",
                "artistName": "Hans Zimmer",
                "collectionName": "Inception (Music from the Motion Picture)",
                "releaseDate": "2010-07-13T07:00:00Z",
                "country": "USA",
                "primaryGenreName": "Soundtrack"
            },
            {
                "wrapperType": "collection",
                "collectionType": "Album",
                "artistName": "Pink Floyd",
                "collectionName": "The Dark Side of the Moon (2011 Remastered Version)",
                "releaseDate": "2011-09-26T07:00:00Z",
                "country": "GBR",
                "primaryGenreName": "Rock"
            },
            {
                "wrapperType": "collection",
                "collectionType": "Album",
                "artistName": "Obscure Band",
                "collectionName": "Rare - EP",
                "releaseDate": "2004-03-01T08:00:00Z",
                "country": "NZL",
                "primaryGenreName": "Alternative"
            },
            {
                "wrapperType": "collection",
                "collectionType": "Album",
                "artistName": "Nobody",
                "collectionName": "No Date"
            }
        ]
    }"#;

    #[test]
    fn test_parse_collections() {
        let candidates = parse_response(FIXTURE).unwrap();
        assert_eq!(candidates.len(), 3);

        let inception = &candidates[0];
        assert_eq!(inception.provider, Provider::ITunes);
        assert_eq!(inception.year, 2010);
        assert_eq!(inception.release_type, ReleaseType::Soundtrack);
        assert_eq!(inception.country.as_deref(), Some("US"));
        assert!(inception.is_official);
        assert!(!inception.is_reissue);

        let dsotm = &candidates[1];
        assert!(dsotm.is_reissue);
        assert_eq!(dsotm.year, 2011);
        assert_eq!(dsotm.release_group_year, None);
        assert_eq!(dsotm.release_type, ReleaseType::Album);

        let ep = &candidates[2];
        assert_eq!(ep.album, "Rare");
        assert_eq!(ep.release_type, ReleaseType::Ep);
        assert_eq!(ep.country, None);
    }

    #[test]
    fn test_empty_result() {
        let candidates = parse_response(r#"{"resultCount":0,"results":[]}"#).unwrap();
        assert!(candidates.is_empty());
    }
}
