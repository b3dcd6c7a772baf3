use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::AppError;
use crate::tts::engine::{SpeechEngine, SynthesisInput};
use crate::tts::voice::PiperVoice;
use crate::tts::wav;

/// An in-process speech model.
pub trait SpeechModel: Send + Sync {
    /// Returns mono samples in `[-1.0, 1.0]` and their sample rate.
    fn infer(
        &self,
        text: &str,
        reference_audio: Option<&Path>,
        reference_text: Option<&str>,
    ) -> Result<(Vec<f32>, u32), AppError>;
}

/// Engine backed by a model loaded once at startup.
///
/// A model that failed to load leaves the engine permanently unavailable;
/// requests then fail with `ServiceUnavailable` instead of crashing the server.
pub struct ModelEngine<M> {
    name: String,
    model: Option<M>,
}

impl<M: SpeechModel> ModelEngine<M> {
    pub fn new(name: impl Into<String>, model: Option<M>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }

    pub fn load<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: FnOnce() -> Result<M, AppError>,
    {
        let name = name.into();
        tracing::info!("Initializing {} model...", name);

        let model = match loader() {
            Ok(model) => {
                tracing::info!("{} model loaded successfully", name);
                Some(model)
            }
            Err(e) => {
                tracing::error!("Failed to load {} model: {}", name, e);
                None
            }
        };

        Self { name, model }
    }
}

impl<M: SpeechModel> SpeechEngine for ModelEngine<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_voices(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        self.model.is_some()
    }

    fn synthesize(&self, input: &SynthesisInput) -> Result<Vec<u8>, AppError> {
        let model = self.model.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable(format!(
                "{} model not loaded. Check server logs.",
                self.name
            ))
        })?;

        let (samples, sample_rate) = model.infer(
            &input.text,
            input.reference_audio.as_deref().map(Path::new),
            input.reference_text.as_deref(),
        )?;

        wav::samples_to_wav(&samples, sample_rate)
    }
}

/// Text to IPA through the `espeak-ng` command line.
#[derive(Debug, Clone)]
pub struct Espeak {
    program: PathBuf,
}

impl Default for Espeak {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl Espeak {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn phonemize(&self, text: &str, voice: &str) -> Result<String, AppError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let output = Command::new(&self.program)
            .args(["--ipa", "-q", "-v", voice])
            .arg(text)
            .output()
            .map_err(|e| {
                AppError::EngineError(format!(
                    "Failed to run {} (is it installed?): {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(AppError::EngineError(format!(
                "espeak-ng failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // One line per clause; the model takes them as a single utterance
        let phonemes = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(phonemes)
    }
}

/// A Piper voice run in-process through ONNX Runtime.
pub struct OnnxPiperModel {
    voice: PiperVoice,
    espeak: Espeak,
    session: Mutex<Session>,
}

fn ort_error<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> AppError {
    move |e| AppError::EngineError(format!("{}: {}", context, e))
}

impl OnnxPiperModel {
    pub fn load(voices_dir: &Path, voice_id: &str, espeak: Espeak) -> Result<Self, AppError> {
        let voice = PiperVoice::load(voices_dir, voice_id)?;

        let session = Session::builder()
            .map_err(ort_error("Failed to create ONNX session"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error("Failed to set optimization level"))?
            .with_intra_threads(4)
            .map_err(ort_error("Failed to set intra-op threads"))?
            .commit_from_file(&voice.model_path)
            .map_err(ort_error("Failed to load voice model"))?;

        tracing::info!(
            "Loaded ONNX voice '{}' ({} Hz)",
            voice.id,
            voice.config.audio.sample_rate
        );

        Ok(Self {
            voice,
            espeak,
            session: Mutex::new(session),
        })
    }

    fn run(&self, phoneme_ids: Vec<i64>) -> Result<Vec<f32>, AppError> {
        let len = phoneme_ids.len();

        // VITS graph inputs: input [1, len], input_lengths [1], scales [3]
        let input = Value::from_array((vec![1, len], phoneme_ids))
            .map_err(ort_error("Failed to build input tensor"))?;
        let input_lengths = Value::from_array((vec![1], vec![len as i64]))
            .map_err(ort_error("Failed to build length tensor"))?;
        let scales = Value::from_array((vec![3], self.voice.config.inference.scales()))
            .map_err(ort_error("Failed to build scales tensor"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::EngineError("ONNX session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![input, input_lengths, scales])
            .map_err(ort_error("Inference failed"))?;

        let audio = outputs
            .get("output")
            .ok_or_else(|| AppError::EngineError("Voice model has no 'output' tensor".into()))?;
        let (_, samples) = audio
            .try_extract_tensor::<f32>()
            .map_err(ort_error("Failed to read output tensor"))?;

        Ok(samples.to_vec())
    }
}

impl SpeechModel for OnnxPiperModel {
    fn infer(
        &self,
        text: &str,
        reference_audio: Option<&Path>,
        reference_text: Option<&str>,
    ) -> Result<(Vec<f32>, u32), AppError> {
        if reference_audio.is_some() || reference_text.is_some() {
            tracing::debug!(
                "Voice '{}' has no reference conditioning; ignoring reference input",
                self.voice.id
            );
        }

        let config = &self.voice.config;
        let phonemes = self.espeak.phonemize(text, config.espeak_voice())?;
        let samples = self.run(config.phoneme_ids(&phonemes))?;

        Ok((samples, config.audio.sample_rate))
    }
}
