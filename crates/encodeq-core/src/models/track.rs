use serde::{Deserialize, Serialize};

/// Tag data handed to the encoder alongside the audio.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
    pub genre: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdDiscInfo {
    pub disc_artist: String,
    pub disc_title: String,
    pub year: u32,
    pub genre: String,
    pub various_artists: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CdTrackInfo {
    /// Zero-based position on the disc.
    pub track_on_disc: u32,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CdTrackInfo {
    pub fn new(track_on_disc: u32, title: impl Into<String>) -> Self {
        Self {
            track_on_disc,
            title: title.into(),
            artist: String::new(),
            active: true,
        }
    }

    pub fn track_number(&self) -> u32 {
        self.track_on_disc + 1
    }
}
