/// Process-wide configuration
///
/// Built once at startup from the command line and the optional
/// `iptc_annotate.conf` file, then passed by reference to every component.
/// Nothing here is mutated after `Configuration::from_cli` returns.

use crate::error::ConfigError;
use clap::Parser;
use log::warn;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file looked up in the working and user config directories
pub const CONFIG_FILE_NAME: &str = "iptc_annotate.conf";

/// Section of the config file holding the inference settings
const CONFIG_SECTION: &str = "ollama";

const DEFAULT_MODEL: &str = "llava:7b";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: f64 = 120.0;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(
    name = "iptc-annotate",
    version,
    about = "Recursively annotate JPEG images with IPTC keywords and captions/abstracts using a local vision model"
)]
pub struct Cli {
    /// Directory to recursively scan for JPEG images
    pub directory: PathBuf,

    /// Overwrite existing IPTC entries
    #[arg(short, long)]
    pub overwrite: bool,

    /// Desired output language as ISO 639-1 code
    #[arg(short, long, default_value = LanguageCode::DEFAULT)]
    pub language: String,

    /// Path to the config file (defaults to ./iptc_annotate.conf, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// A validated, lowercase two-letter language code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// The language the model answers in; translating to it is a no-op
    pub const DEFAULT: &'static str = "en";

    pub fn parse(code: &str) -> Result<Self, ConfigError> {
        let code = code.trim();
        if code.chars().count() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidLanguage(code.to_string()));
        }
        Ok(Self(code.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for LanguageCode {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `[ollama]` group of the config file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub model: String,
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout: f64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Immutable run configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub directory: PathBuf,
    pub overwrite: bool,
    pub language: LanguageCode,
}

impl Configuration {
    /// Validate the command line and merge it with the config file settings
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let language = LanguageCode::parse(&cli.language)?;

        if !cli.directory.is_dir() {
            return Err(ConfigError::MissingDirectory(cli.directory));
        }

        let settings = load_settings(cli.config.as_deref())?;
        Self::from_parts(settings, cli.directory, cli.overwrite, language)
    }

    fn from_parts(
        settings: OllamaSettings,
        directory: PathBuf,
        overwrite: bool,
        language: LanguageCode,
    ) -> Result<Self, ConfigError> {
        let invalid_timeout = || ConfigError::InvalidValue {
            key: "timeout",
            message: format!("{} is not a positive number of seconds", settings.timeout),
        };
        if settings.timeout <= 0.0 {
            return Err(invalid_timeout());
        }
        let timeout =
            Duration::try_from_secs_f64(settings.timeout).map_err(|_| invalid_timeout())?;

        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "base_url",
                message: "must not be empty".to_string(),
            });
        }

        let model = settings.model.trim().to_string();
        if model.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "model",
                message: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            model,
            base_url,
            timeout,
            directory,
            overwrite,
            language,
        })
    }
}

/// Candidate config file locations, most specific first
fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("iptc-annotate");
        dir.push(CONFIG_FILE_NAME);
        candidates.push(dir);
    }
    candidates
}

/// Load the `[ollama]` settings, falling back to defaults when the file or the group is absent
pub fn load_settings(explicit: Option<&Path>) -> Result<OllamaSettings, ConfigError> {
    match config_candidates(explicit).into_iter().find(|p| p.is_file()) {
        Some(path) => read_settings(&path),
        None => {
            warn!(
                "No config file {} or missing section [{}]. Proceeding with default settings.",
                CONFIG_FILE_NAME, CONFIG_SECTION
            );
            Ok(OllamaSettings::default())
        }
    }
}

/// Read the settings group from one INI file
fn read_settings(path: &Path) -> Result<OllamaSettings, ConfigError> {
    let unreadable = |e: ::config::ConfigError| ConfigError::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let file = ::config::Config::builder()
        .add_source(::config::File::from(path).format(::config::FileFormat::Ini))
        .build()
        .map_err(unreadable)?;

    match file.get::<OllamaSettings>(CONFIG_SECTION) {
        Ok(settings) => Ok(settings),
        Err(::config::ConfigError::NotFound(_)) => {
            warn!(
                "Config file {} has no section [{}]. Proceeding with default settings.",
                path.display(),
                CONFIG_SECTION
            );
            Ok(OllamaSettings::default())
        }
        Err(e) => Err(unreadable(e)),
    }
}
