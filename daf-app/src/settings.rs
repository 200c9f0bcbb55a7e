//! Simple settings persistence for DAF
//!
//! Stores the user's last delay time and pitch shift so a new session picks
//! up where the previous one left off. Persistence lives entirely at the
//! host boundary; the engine itself never touches the filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// User settings restored at startup and saved on exit
#[derive(Debug, Default, PartialEq)]
pub struct Settings {
    /// Delay time in milliseconds
    pub delay_time_ms: Option<f32>,
    /// Pitch shift in semitones
    pub pitch_semitones: Option<f32>,
}

impl Settings {
    /// Load settings from the default location
    ///
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::settings_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save settings to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::settings_path();
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Get the default settings file path
    pub fn settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daf")
            .join("settings.txt")
    }

    /// Parse settings from simple key=value format
    fn parse(content: &str) -> Self {
        let mut settings = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "delay_time_ms" => settings.delay_time_ms = value.parse().ok(),
                    "pitch_semitones" => settings.pitch_semitones = value.parse().ok(),
                    _ => {} // Ignore unknown keys
                }
            }
        }

        settings
    }

    /// Serialize settings to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push("# DAF Settings".to_string());

        if let Some(delay) = self.delay_time_ms {
            lines.push(format!("delay_time_ms={}", delay));
        }
        if let Some(pitch) = self.pitch_semitones {
            lines.push(format!("pitch_semitones={}", pitch));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let settings = Settings::parse("");
        assert!(settings.delay_time_ms.is_none());
        assert!(settings.pitch_semitones.is_none());
    }

    #[test]
    fn test_parse_values() {
        let settings = Settings::parse("delay_time_ms=150\npitch_semitones=-2.5");
        assert_eq!(settings.delay_time_ms, Some(150.0));
        assert_eq!(settings.pitch_semitones, Some(-2.5));
    }

    #[test]
    fn test_parse_with_comments_and_junk() {
        let content = "# Comment\ndelay_time_ms=80\nnot a setting\nunknown_key=1";
        let settings = Settings::parse(content);
        assert_eq!(settings.delay_time_ms, Some(80.0));
        assert!(settings.pitch_semitones.is_none());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let settings = Settings {
            delay_time_ms: Some(120.0),
            pitch_semitones: Some(3.0),
        };

        let serialized = settings.serialize();
        let parsed = Settings::parse(&serialized);

        assert_eq!(parsed, settings);
    }
}
