//! Settings for compiling and voicing a book.
//!
//! Loaded from a `settings.json` file using the same camelCase keys as the
//! original tool. Every section has defaults, so a partial file (or none at
//! all) is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Default synthesis endpoint (Yandex SpeechKit v1).
pub const DEFAULT_ENDPOINT: &str = "https://tts.api.cloud.yandex.net/speech/v1/tts:synthesize";

/// Emotional coloring requested from the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Good,
    Evil,
    #[default]
    Neutral,
}

impl Emotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Good => "good",
            Emotion::Evil => "evil",
            Emotion::Neutral => "neutral",
        }
    }
}

/// Audio container requested from the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Oggopus,
    Lpcm,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Oggopus => "oggopus",
            AudioFormat::Lpcm => "lpcm",
        }
    }

    /// File extension used for clips and assembled sections.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Oggopus => "ogg",
            AudioFormat::Lpcm => "pcm",
        }
    }
}

/// External tool used to join clips into one file per section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatTool {
    #[default]
    Ffmpeg,
    Sox,
}

/// Voice assigned to each reading role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Voices {
    pub narrator: String,
    pub companion1: String,
    pub companion2: String,
    pub titles: String,
    pub notes: String,
}

impl Default for Voices {
    fn default() -> Self {
        Self {
            narrator: "oksana".into(),
            companion1: "zahar".into(),
            companion2: "omazh".into(),
            titles: "zahar".into(),
            notes: "ermil".into(),
        }
    }
}

/// Toggles for the text normalization rules, applied in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transforms {
    pub filter_symbols: bool,
    pub remove_broken_chars: bool,
    pub remove_footnotes_from_text: bool,
    pub convert_ellipsis_to_dots: bool,
    pub convert_rome_to_number: bool,
    /// Replacement for a `* * *` dinkus line; `None` leaves it alone.
    pub replace_dinkus: Option<String>,
    pub remove_separators: bool,
    pub replace_nb_sp: bool,
    pub normalize_whitespace: bool,
    pub prevent_speechkit_kopeek: bool,
    pub prevent_speechkit_rubley: bool,
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            filter_symbols: false,
            remove_broken_chars: true,
            remove_footnotes_from_text: true,
            convert_ellipsis_to_dots: true,
            convert_rome_to_number: true,
            replace_dinkus: None,
            remove_separators: true,
            replace_nb_sp: true,
            normalize_whitespace: true,
            prevent_speechkit_kopeek: false,
            prevent_speechkit_rubley: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub language: String,
    pub voices: Voices,
    pub speed: f32,
    pub notes_speed: f32,

    /// Seconds of silence for `<empty-line/>` and pauses without a duration.
    pub default_pause: f32,
    pub title_pause: f32,
    pub sentence_pause: f32,

    /// Valuable characters a section must hold before another may start.
    pub section_size: usize,
    /// Longest content sent in one synthesis call.
    pub max_chunk_length: usize,

    /// Per-request timeout, seconds.
    pub timeout: u64,
    /// Extra attempts after a timed-out request.
    pub retries: u32,

    /// Read footnotes inline, in the notes voice.
    pub footnotes: bool,
    /// Literal markup spoken in place of an inline image.
    pub image: Option<String>,
    pub sub: Option<String>,
    pub sup: Option<String>,

    pub transforms: Transforms,
    pub concat_tool: ConcatTool,
    pub format: AudioFormat,
    pub sample_rate_hertz: Option<u32>,

    pub endpoint: String,
    pub iam_token: Option<String>,
    pub api_key: Option<String>,
    pub folder_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "ru-RU".into(),
            voices: Voices::default(),
            speed: 1.0,
            notes_speed: 1.0,
            default_pause: 1.0,
            title_pause: 3.0,
            sentence_pause: 0.5,
            section_size: 10_000,
            max_chunk_length: 4_500,
            timeout: 5 * 60,
            retries: 3,
            footnotes: true,
            image: None,
            sub: None,
            sup: None,
            transforms: Transforms::default(),
            concat_tool: ConcatTool::default(),
            format: AudioFormat::default(),
            sample_rate_hertz: None,
            endpoint: DEFAULT_ENDPOINT.into(),
            iam_token: None,
            api_key: None,
            folder_id: None,
        }
    }
}

impl Settings {
    /// Parse settings from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&contents)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load `path` if given, else `./settings.json` if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(PathBuf::from).or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|dir| dir.join("settings.json"))
                .filter(|p| p.exists())
        });

        match resolved {
            Some(path) => Self::load(&path),
            None => {
                info!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_length == 0 {
            return Err(Error::InvalidSettings(
                "maxChunkLength must be greater than zero".into(),
            ));
        }
        for (name, speed) in [("speed", self.speed), ("notesSpeed", self.notes_speed)] {
            if !(0.1..=3.0).contains(&speed) {
                return Err(Error::InvalidSettings(format!(
                    "{name} must be between 0.1 and 3.0, got {speed}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let settings = Settings::from_json(
            r#"{
                "voices": { "narrator": "jane" },
                "titlePause": 2,
                "concatTool": "sox",
                "transforms": { "replaceDinkus": "***" }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.voices.narrator, "jane");
        assert_eq!(settings.voices.companion1, "zahar");
        assert_eq!(settings.title_pause, 2.0);
        assert_eq!(settings.concat_tool, ConcatTool::Sox);
        assert_eq!(settings.transforms.replace_dinkus.as_deref(), Some("***"));
        assert!(settings.transforms.normalize_whitespace);
    }

    #[test]
    fn test_zero_chunk_length_rejected() {
        let err = Settings::from_json(r#"{ "maxChunkLength": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));
    }

    #[test]
    fn test_speed_out_of_range_rejected() {
        assert!(Settings::from_json(r#"{ "speed": 5 }"#).is_err());
        assert!(Settings::from_json(r#"{ "notesSpeed": 0 }"#).is_err());
    }

    #[test]
    fn test_format_extension() {
        assert_eq!(AudioFormat::Oggopus.extension(), "ogg");
        assert_eq!(AudioFormat::Lpcm.as_str(), "lpcm");
    }
}
