pub mod engine;
pub mod model;
pub mod voice;
pub mod wav;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::AppError;

pub use engine::{PiperCli, SpeechEngine, SynthesisInput};
pub use model::{Espeak, ModelEngine, OnnxPiperModel, SpeechModel};
pub use voice::{VoiceDescriptor, VoiceEntry, VoiceRegistry, DEFAULT_VOICE};
pub use wav::WavFormat;

/// Characters of request text echoed into log lines.
const LOG_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub reference_audio: Option<String>,
    #[serde(default)]
    pub reference_text: Option<String>,
}

/// Synthesized audio plus the format read from its header.
#[derive(Debug, Clone)]
pub struct SpeechResult {
    pub audio: Vec<u8>,
    pub format: WavFormat,
    pub voice: Option<String>,
}

/// Validates speech requests and hands them to the configured engine.
pub struct SpeechService {
    engine: Arc<dyn SpeechEngine>,
    registry: VoiceRegistry,
    voices_dir: PathBuf,
    default_voice: String,
    max_text_chars: Option<usize>,
}

impl SpeechService {
    pub fn new(engine: Arc<dyn SpeechEngine>, registry: VoiceRegistry, voices_dir: PathBuf) -> Self {
        Self {
            engine,
            registry,
            voices_dir,
            default_voice: DEFAULT_VOICE.to_string(),
            max_text_chars: None,
        }
    }

    pub fn with_default_voice(mut self, voice: impl Into<String>) -> Self {
        self.default_voice = voice.into();
        self
    }

    /// Reject request text longer than `max` characters.
    pub fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = Some(max);
        self
    }

    pub fn engine(&self) -> &dyn SpeechEngine {
        self.engine.as_ref()
    }

    pub fn voices_dir(&self) -> &Path {
        &self.voices_dir
    }

    /// `None` when the engine does not route requests through the registry.
    pub fn default_voice(&self) -> Option<&str> {
        self.engine
            .uses_voices()
            .then_some(self.default_voice.as_str())
    }

    pub async fn generate_speech(&self, request: SpeechRequest) -> Result<SpeechResult, AppError> {
        let voice = self
            .engine
            .uses_voices()
            .then(|| self.voice_name(&request).to_string());
        let input = self.prepare(request)?;

        let preview: String = input.text.chars().take(LOG_PREVIEW_CHARS).collect();
        match &voice {
            Some(name) => tracing::info!("Generating speech with voice '{}': {}...", name, preview),
            None => tracing::info!("Generating speech with {}: {}...", self.engine.name(), preview),
        }

        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || engine.synthesize(&input)).await;

        let audio = match outcome {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => {
                tracing::error!("Speech generation failed: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Speech generation aborted: {:?}", e);
                return Err(AppError::EngineError(format!(
                    "Speech generation failed: {}",
                    e
                )));
            }
        };

        let format = wav::inspect(&audio)?;
        tracing::info!(
            "Generated {} bytes of audio ({} Hz, {} ch)",
            audio.len(),
            format.sample_rate,
            format.channels
        );

        Ok(SpeechResult {
            audio,
            format,
            voice,
        })
    }

    /// The requested voice, or the default when none (or an empty one) is given.
    fn voice_name<'a>(&'a self, request: &'a SpeechRequest) -> &'a str {
        request
            .voice
            .as_deref()
            .filter(|voice| !voice.is_empty())
            .unwrap_or(&self.default_voice)
    }

    /// Validate a request and resolve it into engine input. Runs every check
    /// that must pass before the engine is touched.
    pub fn prepare(&self, request: SpeechRequest) -> Result<SynthesisInput, AppError> {
        if request.text.trim().is_empty() {
            return Err(AppError::InvalidInput("Text cannot be empty".into()));
        }

        if let Some(max) = self.max_text_chars {
            if request.text.chars().count() > max {
                return Err(AppError::InvalidInput(format!(
                    "Text too long (max {} chars)",
                    max
                )));
            }
        }

        let model_path = if self.engine.uses_voices() {
            let voice_name = self.voice_name(&request);

            let entry = self.registry.get(voice_name).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Voice '{}' not found. Available voices: {:?}",
                    voice_name,
                    self.registry.names()
                ))
            })?;

            let model_path = self.voices_dir.join(&entry.model_file);
            if !model_path.is_file() {
                return Err(AppError::NotFound(format!(
                    "Voice model not found: {}. Please download it first.",
                    entry.model_file
                )));
            }
            Some(model_path)
        } else {
            if let Some(voice) = request.voice.as_deref().filter(|v| !v.is_empty()) {
                tracing::debug!("Ignoring voice '{}' for {}", voice, self.engine.name());
            }
            None
        };

        if !self.engine.is_available() {
            return Err(AppError::ServiceUnavailable(format!(
                "{} engine not available",
                self.engine.name()
            )));
        }

        Ok(SynthesisInput {
            text: request.text,
            model_path,
            reference_audio: request.reference_audio,
            reference_text: request.reference_text,
        })
    }

    /// Registry entries with availability recomputed from the voices directory.
    pub fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, AppError> {
        if !self.engine.uses_voices() {
            return Err(AppError::NotFound(format!(
                "{} does not use selectable voices",
                self.engine.name()
            )));
        }

        Ok(self.registry.describe(&self.voices_dir))
    }

    /// Stems of the `.onnx` models present in the voices directory, sorted.
    pub fn installed_voices(&self) -> Vec<String> {
        let mut stems: Vec<String> = voice::installed_models(&self.voices_dir)
            .into_iter()
            .map(|file| file.trim_end_matches(".onnx").to_string())
            .collect();
        stems.sort();
        stems
    }
}
