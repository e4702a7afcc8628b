//! MusicBrainz release-group search
//!
//! Endpoint: `GET /ws/2/release-group?query=...&fmt=json`
//!
//! A release group bundles every edition of one album, and its
//! `first-release-date` is the original year. Reissues therefore never
//! surface as separate candidates here, which makes MusicBrainz the
//! strongest "original year" signal of the three providers.

use super::http::{build_http_client, decode_json, fetch_body};
use super::{year_prefix, SourceClient};
use crate::config::ProviderSettings;
use crate::error::{ProviderError, SyncResult};
use crate::types::{AlbumQuery, CandidateRelease, Provider, ReleaseType};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const SEARCH_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<ReleaseGroup>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroup {
    id: String,
    title: String,
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
    #[serde(rename = "secondary-types", default)]
    secondary_types: Vec<String>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<ReleaseSummary>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseSummary {
    status: Option<String>,
}

pub struct MusicBrainzClient {
    client: Client,
    base_url: String,
}

impl MusicBrainzClient {
    pub fn new(settings: &ProviderSettings) -> SyncResult<Self> {
        Ok(Self {
            client: build_http_client(settings)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Lucene query over release-group title and credited artist
    fn search_query(query: &AlbumQuery) -> String {
        let album = format!("releasegroup:\"{}\"", lucene_escape(&query.album));
        if query.has_artist() {
            format!("{} AND artist:\"{}\"", album, lucene_escape(&query.artist))
        } else {
            album
        }
    }
}

#[async_trait]
impl SourceClient for MusicBrainzClient {
    fn provider(&self) -> Provider {
        Provider::MusicBrainz
    }

    async fn query(&self, query: &AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError> {
        let url = format!("{}/release-group", self.base_url);
        let search = Self::search_query(query);
        tracing::debug!(query = %search, "Querying MusicBrainz");

        let body = fetch_body(self.client.get(&url).query(&[
            ("query", search.as_str()),
            ("fmt", "json"),
            ("limit", SEARCH_LIMIT),
        ]))
        .await?;
        parse_response(&body)
    }
}

fn lucene_escape(term: &str) -> String {
    term.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Convert a search response body into candidates
pub fn parse_response(body: &str) -> Result<Vec<CandidateRelease>, ProviderError> {
    let response: SearchResponse = decode_json(body)?;

    let candidates = response
        .release_groups
        .into_iter()
        .filter_map(|group| {
            let year = group.first_release_date.as_deref().and_then(year_prefix)?;
            let artist: String = group
                .artist_credit
                .iter()
                .map(|credit| format!("{}{}", credit.name, credit.joinphrase))
                .collect();

            let mut candidate = CandidateRelease::new(Provider::MusicBrainz, artist, group.title, year);
            candidate.release_type = release_type(group.primary_type.as_deref(), &group.secondary_types);
            let statuses: Vec<&str> = group.releases.iter().filter_map(|r| r.status.as_deref()).collect();
            // Search results often omit releases; absence is not evidence of a bootleg
            candidate.is_official = statuses.is_empty() || statuses.iter().any(|s| *s == "Official");
            candidate.is_bootleg = !statuses.is_empty() && statuses.iter().all(|s| *s == "Bootleg");
            candidate.release_group_id = Some(group.id);
            candidate.release_group_year = Some(year);
            Some(candidate)
        })
        .collect();
    Ok(candidates)
}

/// Secondary types (compilation, live, soundtrack) win over the primary type
fn release_type(primary: Option<&str>, secondary: &[String]) -> ReleaseType {
    for label in ["Compilation", "Live", "Soundtrack"] {
        if secondary.iter().any(|s| s.eq_ignore_ascii_case(label)) {
            return ReleaseType::from_provider_label(label);
        }
    }
    primary.map(ReleaseType::from_provider_label).unwrap_or(ReleaseType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "created": "2024-05-01T10:00:00.000Z",
        "count": 3,
        "offset": 0,
        "release-groups": [
            {
                "id": "8a3f4b2c-1111-4c6b-9d7e-000000000001",
                "score": 100,
                "title": "Inception",
                "primary-type": "Album",
                "secondary-types": ["Soundtrack"],
                "first-release-date": "2010-07-13",
                "artist-credit": [{"name": "Hans Zimmer", "artist": {"id": "x", "name": "Hans Zimmer"}}],
                "releases": [{"id": "r1", "title": "Inception", "status": "Official"}]
            },
            {
                "id": "8a3f4b2c-1111-4c6b-9d7e-000000000002",
                "score": 61,
                "title": "Live in Concert",
                "primary-type": "Album",
                "secondary-types": ["Live"],
                "first-release-date": "2017",
                "artist-credit": [
                    {"name": "Hans Zimmer", "joinphrase": " & "},
                    {"name": "Lisa Gerrard"}
                ],
                "releases": [{"id": "r2", "title": "Live", "status": "Bootleg"}]
            },
            {
                "id": "8a3f4b2c-1111-4c6b-9d7e-000000000003",
                "title": "Undated",
                "primary-type": "Single",
                "artist-credit": [{"name": "Hans Zimmer"}]
            }
        ]
    }"#;

    #[test]
    fn test_parse_release_groups() {
        let candidates = parse_response(FIXTURE).unwrap();
        // The undated group is dropped
        assert_eq!(candidates.len(), 2);

        let inception = &candidates[0];
        assert_eq!(inception.provider, Provider::MusicBrainz);
        assert_eq!(inception.artist, "Hans Zimmer");
        assert_eq!(inception.album, "Inception");
        assert_eq!(inception.year, 2010);
        assert_eq!(inception.release_type, ReleaseType::Soundtrack);
        assert!(inception.is_official);
        assert!(!inception.is_bootleg);
        assert_eq!(inception.release_group_year, Some(2010));
        assert!(inception.release_group_id.is_some());

        let live = &candidates[1];
        assert_eq!(live.artist, "Hans Zimmer & Lisa Gerrard");
        assert_eq!(live.release_type, ReleaseType::Live);
        assert!(live.is_bootleg);
        assert!(!live.is_official);
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(parse_response(r#"{"count":0,"release-groups":[]}"#).unwrap().is_empty());
        assert!(parse_response(r#"{"count":0}"#).unwrap().is_empty());
        assert!(matches!(
            parse_response("not json"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_search_query_escapes_and_drops_empty_artist() {
        let q = AlbumQuery::new("Guns N' Roses", "Use Your \"Illusion\"");
        assert_eq!(
            MusicBrainzClient::search_query(&q),
            r#"releasegroup:"Use Your \"Illusion\"" AND artist:"Guns N' Roses""#
        );

        let q = AlbumQuery::new("", "Now 42");
        assert_eq!(MusicBrainzClient::search_query(&q), r#"releasegroup:"Now 42""#);
    }
}
