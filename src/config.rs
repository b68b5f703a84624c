use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

const QUALIFIER: &str = "org.tahkik";
const ORGANIZATION: &str = "Tahkik";
const APPLICATION: &str = "tahkik";
const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Constants of the virtual page used for pagination estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Width of the virtual page's text column, in px
    pub page_width: f32,
    /// Average glyph width as a fraction of the font size
    pub char_width_ratio: f32,
    pub line_height_multiplier: f32,
    /// Height available for lines and their footnotes, in px
    pub page_content_height: f32,
    pub footnote_row_height: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            page_width: 600.0,
            char_width_ratio: 0.5,
            line_height_multiplier: 1.8,
            page_content_height: 800.0,
            footnote_row_height: 24.0,
        }
    }
}

impl LayoutConfig {
    /// Number of characters that fit on one wrapped row at the given font size
    pub fn chars_per_page_line(&self, font_size: f32) -> usize {
        let per_char = font_size * self.char_width_ratio;
        if per_char <= 0.0 || !per_char.is_finite() {
            return 1;
        }
        ((self.page_width / per_char).floor() as usize).max(1)
    }

    pub fn line_height(&self, font_size: f32) -> f32 {
        font_size * self.line_height_multiplier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub font_size: f32,
    pub deletion_grace_secs: u64,
    pub playback_rate: f32,
    pub layout: LayoutConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            font_size: 20.0,
            deletion_grace_secs: 5,
            playback_rate: 1.0,
            layout: LayoutConfig::default(),
        }
    }
}

impl Settings {
    pub fn deletion_grace(&self) -> Duration {
        Duration::from_secs(self.deletion_grace_secs)
    }

    pub fn from_toml(contents: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

pub fn settings_file_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
}

/// Load settings, falling back to defaults when the file is missing or malformed
pub fn load_settings(path: &Path) -> Settings {
    let Ok(contents) = fs::read_to_string(path) else {
        return Settings::default();
    };
    match Settings::from_toml(&contents) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!("Failed to parse settings file {}: {err}", path.display());
            Settings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let toml = toml::to_string_pretty(settings).map_err(|err| {
        io::Error::new(ErrorKind::Other, format!("toml serialization error: {err}"))
    })?;

    fs::write(path, toml)
}
