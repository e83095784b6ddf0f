use serenity::model::id::UserId;
use std::time::Duration;

/// Who asked for a track, as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub mention: String,
}

impl Requester {
    pub fn new(id: UserId, mention: impl Into<String>) -> Self {
        Self {
            id,
            mention: mention.into(),
        }
    }
}

/// One playable item. Never mutated once built; shared as `Arc<Track>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    url: String,
    stream_url: String,
    thumbnail: Option<String>,
    requester: Requester,
    duration_secs: u64,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        stream_url: impl Into<String>,
        requester: Requester,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            stream_url: stream_url.into(),
            thumbnail: None,
            requester,
            duration_secs: 0,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        let thumbnail = thumbnail.into();
        self.thumbnail = (!thumbnail.is_empty()).then_some(thumbnail);
        self
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    /// Opaque locator handed to the transport. It may expire, so it is only
    /// good for the render it was resolved for.
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn requester(&self) -> &Requester {
        &self.requester
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// `None` for live streams and unknown lengths.
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    pub fn is_live(&self) -> bool {
        self.duration_secs == 0
    }
}
