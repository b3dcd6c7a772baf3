use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;
use crate::tts::{VoiceRegistry, DEFAULT_VOICE};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to load voice registry {}: {source}", path.display())]
    Registry {
        path: PathBuf,
        source: AppError,
    },

    #[error("Default voice '{0}' is not in the voice registry")]
    UnknownDefaultVoice(String),
}

/// Which synthesis engine the server drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Piper binary, one subprocess per request.
    PiperCli,
    /// Piper ONNX voice loaded in-process.
    Model,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub piper_bin: PathBuf,
    pub voices_dir: PathBuf,
    pub default_voice: String,
    pub voice_registry: Option<PathBuf>,
    pub model_voice: String,
    pub espeak_bin: PathBuf,
    /// Request text cap in characters; unlimited when unset.
    pub max_text_chars: Option<usize>,
    pub scratch_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| -> String {
            vars.get(name)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let port = var("PORT", "8000");
        let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
            name: "PORT",
            expected: "a port number",
            value: port.clone(),
        })?;

        let backend = match var("TTS_BACKEND", "piper").to_ascii_lowercase().as_str() {
            "piper" | "piper-cli" => Backend::PiperCli,
            "model" | "onnx" => Backend::Model,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "TTS_BACKEND",
                    expected: "'piper' or 'model'",
                    value: other.to_string(),
                })
            }
        };

        let max_text_chars = match vars.get("MAX_TEXT_CHARS") {
            None => None,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "MAX_TEXT_CHARS",
                        expected: "a positive integer",
                        value: raw.clone(),
                    })
                }
            },
        };

        let scratch_dir = vars
            .get("TTS_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port,
            backend,
            piper_bin: var("PIPER_BIN", "/app/piper/piper/piper").into(),
            voices_dir: var("VOICES_DIR", "./voices").into(),
            default_voice: var("DEFAULT_VOICE", DEFAULT_VOICE),
            voice_registry: vars.get("VOICE_REGISTRY").map(PathBuf::from),
            model_voice: var("MODEL_VOICE", "en_US-lessac-medium"),
            espeak_bin: var("ESPEAK_BIN", "espeak-ng").into(),
            max_text_chars,
            scratch_dir,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }

    /// The built-in catalog, or the one named by `VOICE_REGISTRY`. The
    /// default voice must be one of its keys.
    pub fn voice_registry(&self) -> Result<VoiceRegistry, ConfigError> {
        let registry = match &self.voice_registry {
            Some(path) => VoiceRegistry::load(path).map_err(|source| ConfigError::Registry {
                path: path.clone(),
                source,
            })?,
            None => VoiceRegistry::default(),
        };

        if self.backend == Backend::PiperCli && !registry.contains(&self.default_voice) {
            return Err(ConfigError::UnknownDefaultVoice(self.default_voice.clone()));
        }

        Ok(registry)
    }
}
