use std::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has no playable stream for this track
    #[error("No playable stream found for \"{title}\" by \"{artist}\"")]
    NotFound { title: String, artist: String },
    /// The provider could not be reached or misbehaved
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// The closed set of track providers syncopate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    YouTube,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YouTube => write!(f, "youtube"),
        }
    }
}

/// An opaque handle to a playable stream, resolved by a provider.
///
/// The engine never inspects the url; it is forwarded to clients, which do
/// the actual audio playback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHandle {
    pub url: String,
    /// Track length in milliseconds, when the provider knows it
    pub duration_millis: Option<u64>,
}

/// Represents a service that can resolve a track reference to a playable stream.
#[async_trait]
pub trait MusicProvider
where
    Self: 'static + Sync + Send,
{
    fn kind(&self) -> ProviderKind;

    /// Resolves a `(title, artist)` pair to a stream handle.
    async fn resolve(&self, title: &str, artist: &str) -> ProviderResult<StreamHandle>;
}

/// Maps provider kinds to their implementations, looked up at resolve time.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<ProviderKind, Arc<dyn MusicProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing any previous one of the same kind.
    pub fn register<P>(&self, provider: P)
    where
        P: MusicProvider,
    {
        self.providers.insert(provider.kind(), Arc::new(provider));
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn MusicProvider>> {
        self.providers.get(&kind).map(|p| p.clone())
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }
}
