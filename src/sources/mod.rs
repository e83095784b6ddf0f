pub mod ytdlp;

use async_trait::async_trait;

use crate::audio::track::{Requester, Track};
use crate::error::ExtractError;

pub use ytdlp::YtDlpExtractor;

/// Turns a user query into playable tracks.
///
/// Runs outside any guild lock. An empty vector means nothing playable was
/// found; the caller reports that as an empty result rather than a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackExtractor: Send + Sync {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Vec<Track>, ExtractError>;
}
