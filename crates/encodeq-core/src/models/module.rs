use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputModuleId {
    Lame,
    OggVorbis,
    Aac,
    Opus,
    Flac,
    Wave,
    Wma,
}

const ALL_OUTPUT_MODULES: [OutputModuleId; 7] = [
    OutputModuleId::Lame,
    OutputModuleId::OggVorbis,
    OutputModuleId::Aac,
    OutputModuleId::Opus,
    OutputModuleId::Flac,
    OutputModuleId::Wave,
    OutputModuleId::Wma,
];

const LOSSY_INPUT_EXTENSIONS: &[&str] = &["mp3", "mp2", "ogg", "aac", "m4a", "spx", "opus", "wma"];

impl OutputModuleId {
    pub fn all() -> &'static [OutputModuleId] {
        &ALL_OUTPUT_MODULES
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Lame => "lame",
            Self::OggVorbis => "ogg_vorbis",
            Self::Aac => "aac",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Wave => "wave",
            Self::Wma => "wma",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Lame => "LAME MP3 Encoder",
            Self::OggVorbis => "Ogg Vorbis Encoder",
            Self::Aac => "AAC Encoder",
            Self::Opus => "Opus Encoder",
            Self::Flac => "FLAC Encoder",
            Self::Wave => "Wave Output",
            Self::Wma => "Windows Media Audio Encoder",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Lame => "mp3",
            Self::OggVorbis => "ogg",
            Self::Aac => "m4a",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Wave => "wav",
            Self::Wma => "wma",
        }
    }

    pub fn is_lossy(self) -> bool {
        matches!(
            self,
            Self::Lame | Self::OggVorbis | Self::Aac | Self::Opus | Self::Wma
        )
    }
}

impl FromStr for OutputModuleId {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ALL_OUTPUT_MODULES
            .iter()
            .copied()
            .find(|module| module.key() == normalized || module.extension() == normalized)
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!("unknown output module '{value}'"),
                )
            })
    }
}

/// Decides lossiness of an input file from its extension.
pub fn is_lossy_input(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            let extension = extension.to_ascii_lowercase();
            LOSSY_INPUT_EXTENSIONS.contains(&extension.as_str())
        })
        .unwrap_or(false)
}
