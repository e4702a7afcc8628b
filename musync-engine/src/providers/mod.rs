//! External metadata providers
//!
//! Every provider implements [`SourceClient`]; the coordinator only ever
//! sees `Arc<dyn SourceClient>`. Clients do one request per query and
//! leave throttling and retries to `rate_limit` and `retry`.

pub mod discogs;
pub mod http;
pub mod itunes;
pub mod musicbrainz;

use crate::config::SyncConfig;
use crate::error::{ProviderError, SyncResult};
use crate::types::{AlbumQuery, CandidateRelease, Provider};
use async_trait::async_trait;
use std::sync::Arc;

pub use discogs::DiscogsClient;
pub use itunes::ITunesClient;
pub use musicbrainz::MusicBrainzClient;

/// One provider's search capability
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Candidate releases for the query
    ///
    /// An empty list and [`ProviderError::NotFound`] both mean "nothing here".
    async fn query(&self, query: &AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError>;
}

/// Clients for all enabled providers, in priority order
pub fn build_clients(config: &SyncConfig) -> SyncResult<Vec<Arc<dyn SourceClient>>> {
    let mut clients: Vec<Arc<dyn SourceClient>> = Vec::new();
    for provider in config.enabled_providers() {
        let settings = config.providers.settings_for(provider);
        match provider {
            Provider::MusicBrainz => clients.push(Arc::new(MusicBrainzClient::new(&settings)?)),
            Provider::Discogs => {
                if settings.token.is_none() {
                    tracing::warn!("Discogs enabled without a token; skipping provider");
                    continue;
                }
                clients.push(Arc::new(DiscogsClient::new(&settings)?));
            }
            Provider::ITunes => clients.push(Arc::new(ITunesClient::new(&settings)?)),
        }
    }
    tracing::info!(
        providers = ?clients.iter().map(|c| c.provider()).collect::<Vec<_>>(),
        "Provider clients ready"
    );
    Ok(clients)
}

/// Leading four-digit year of a date string ("2010", "2010-07-13", "2010-07-13T07:00:00Z")
pub(crate) fn year_prefix(date: &str) -> Option<i32> {
    let digits = date.trim().get(..4)?;
    if digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}
