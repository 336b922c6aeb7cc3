use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "BrainScan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shown with every diagnosis and health response.
pub const DISCLAIMER: &str = "This tool is for informational purposes only and must not replace a doctor's diagnosis.";

/// File name of the exported tumor classifier inside the models directory.
pub const CLASSIFIER_FILE_NAME: &str = "brain_tumor_detection_model.onnx";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8700";
const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "medgemma:latest";
const DEFAULT_WIKIPEDIA_URL: &str = "https://en.wikipedia.org";
const DEFAULT_SPEECH_COMMAND: &str = "espeak-ng --stdin";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Default `RUST_LOG` filter when the environment does not set one.
pub fn default_log_filter() -> &'static str {
    "brainscan=info,tower_http=warn"
}

/// Get the application data directory
/// ~/BrainScan/ on all platforms.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Get the models directory (ONNX classifier)
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Default location of the classifier artifact.
pub fn default_classifier_path() -> PathBuf {
    models_dir().join(CLASSIFIER_FILE_NAME)
}

// ═══════════════════════════════════════════════════════════
// Runtime configuration
// ═══════════════════════════════════════════════════════════

/// Which hosted/local model answers the help-assist chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantProvider {
    Gemini,
    Ollama,
}

/// Explanation knobs (perturbation count, segments shown, blackout).
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainerSettings {
    pub num_samples: usize,
    pub num_features: usize,
    pub hide_rest: bool,
}

impl Default for ExplainerSettings {
    fn default() -> Self {
        Self {
            num_samples: 1000,
            num_features: 5,
            hide_rest: false,
        }
    }
}

/// Everything read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub classifier_path: PathBuf,
    pub explainer: ExplainerSettings,
    pub assistant: AssistantProvider,
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub ollama_host: String,
    pub ollama_model: String,
    pub wikipedia_url: String,
    pub speech_enabled: bool,
    pub speech_command: String,
    pub http_timeout_secs: u64,
    pub dump_dir: Option<PathBuf>,
    /// Rotate raster uploads by their EXIF orientation tag. Off: the
    /// classifier sees pixels exactly as stored.
    pub exif_orientation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8700)),
            classifier_path: default_classifier_path(),
            explainer: ExplainerSettings::default(),
            assistant: AssistantProvider::Gemini,
            google_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            ollama_host: DEFAULT_OLLAMA_HOST.into(),
            ollama_model: DEFAULT_OLLAMA_MODEL.into(),
            wikipedia_url: DEFAULT_WIKIPEDIA_URL.into(),
            speech_enabled: true,
            speech_command: DEFAULT_SPEECH_COMMAND.into(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            dump_dir: None,
            exif_orientation: false,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("BRAINSCAN_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "BRAINSCAN_BIND",
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let explainer = ExplainerSettings {
            num_samples: parse_or(
                "BRAINSCAN_LIME_SAMPLES",
                get("BRAINSCAN_LIME_SAMPLES"),
                defaults.explainer.num_samples,
            )?,
            num_features: parse_or(
                "BRAINSCAN_LIME_FEATURES",
                get("BRAINSCAN_LIME_FEATURES"),
                defaults.explainer.num_features,
            )?,
            hide_rest: parse_flag(
                "BRAINSCAN_LIME_HIDE_REST",
                get("BRAINSCAN_LIME_HIDE_REST"),
                defaults.explainer.hide_rest,
            )?,
        };
        if explainer.num_samples == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BRAINSCAN_LIME_SAMPLES",
                value: "0".into(),
                reason: "at least one perturbation sample is required".into(),
            });
        }

        let assistant = match get("BRAINSCAN_ASSISTANT").as_deref() {
            None => defaults.assistant,
            Some(v) if v.eq_ignore_ascii_case("gemini") => AssistantProvider::Gemini,
            Some(v) if v.eq_ignore_ascii_case("ollama") => AssistantProvider::Ollama,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "BRAINSCAN_ASSISTANT",
                    value: other.to_string(),
                    reason: "expected `gemini` or `ollama`".into(),
                })
            }
        };

        Ok(Self {
            bind_addr,
            classifier_path: get("BRAINSCAN_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.classifier_path),
            explainer,
            assistant,
            google_api_key: get("GOOGLE_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            ollama_host: get("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            wikipedia_url: get("BRAINSCAN_WIKIPEDIA_URL").unwrap_or(defaults.wikipedia_url),
            speech_enabled: parse_flag(
                "BRAINSCAN_SPEECH",
                get("BRAINSCAN_SPEECH"),
                defaults.speech_enabled,
            )?,
            speech_command: get("BRAINSCAN_SPEECH_COMMAND").unwrap_or(defaults.speech_command),
            http_timeout_secs: parse_or(
                "BRAINSCAN_HTTP_TIMEOUT_SECS",
                get("BRAINSCAN_HTTP_TIMEOUT_SECS"),
                defaults.http_timeout_secs,
            )?,
            dump_dir: get("BRAINSCAN_DUMP_DIR").map(PathBuf::from),
            exif_orientation: parse_flag(
                "BRAINSCAN_EXIF_ORIENTATION",
                get("BRAINSCAN_EXIF_ORIENTATION"),
                defaults.exif_orientation,
            )?,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_flag(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("on") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("off") | Some("no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            value: other.to_string(),
            reason: "expected a boolean flag".into(),
        }),
    }
}
