use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::AppError;

/// Everything an engine needs for one synthesis call.
#[derive(Debug, Clone, Default)]
pub struct SynthesisInput {
    pub text: String,
    /// Resolved voice model, set for engines that use the voice registry.
    pub model_path: Option<PathBuf>,
    pub reference_audio: Option<String>,
    pub reference_text: Option<String>,
}

/// A text-to-speech backend producing WAV bytes.
///
/// Implementations are called from blocking worker threads, one call per
/// request, and must not share mutable state between calls.
pub trait SpeechEngine: Send + Sync {
    /// Display name used in service metadata and logs.
    fn name(&self) -> &str;

    /// Whether requests are routed through the voice registry.
    fn uses_voices(&self) -> bool;

    /// Whether the binary or model is ready to synthesize.
    fn is_available(&self) -> bool;

    fn synthesize(&self, input: &SynthesisInput) -> Result<Vec<u8>, AppError>;
}

/// Runs the Piper binary once per request, text on stdin, audio to a temp file.
pub struct PiperCli {
    binary: PathBuf,
    scratch_dir: PathBuf,
}

impl PiperCli {
    pub fn new(binary: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            binary,
            scratch_dir,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, text: &str, model_path: &Path) -> Result<Vec<u8>, AppError> {
        // Removed on drop, whichever way we leave this function
        let output_file = tempfile::Builder::new()
            .prefix("speech-")
            .suffix(".wav")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| AppError::EngineError(format!("Failed to create temp file: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(model_path)
            .arg("--output_file")
            .arg(output_file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::EngineError(format!("Piper subprocess error: {}", e)))?;

        // Write stdin while wait_with_output drains stdout and stderr; any of
        // the three pipes can fill
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(text.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (output, writer.join())
        });

        let output =
            output.map_err(|e| AppError::EngineError(format!("Piper subprocess error: {}", e)))?;

        match written {
            Ok(Ok(())) => {}
            // Piper exited before reading; its status and stderr tell the story
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                tracing::debug!("Piper closed stdin early");
            }
            Ok(Err(e)) => {
                return Err(AppError::EngineError(format!(
                    "Piper subprocess error: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(AppError::EngineError(
                    "Piper subprocess error: stdin writer panicked".into(),
                ));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("Piper error ({}): {}", output.status, stderr.trim());
            return Err(AppError::EngineError(format!(
                "Piper TTS failed: {}",
                stderr.trim()
            )));
        }

        let audio = std::fs::read(output_file.path())
            .map_err(|e| AppError::EngineError(format!("Failed to read Piper output: {}", e)))?;

        Ok(audio)
    }
}

impl SpeechEngine for PiperCli {
    fn name(&self) -> &str {
        "Piper Neural TTS"
    }

    fn uses_voices(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        self.binary.is_file()
    }

    fn synthesize(&self, input: &SynthesisInput) -> Result<Vec<u8>, AppError> {
        let model_path = input.model_path.as_deref().ok_or_else(|| {
            AppError::EngineError("Piper requires a voice model path".into())
        })?;

        // Reference conditioning is an ML-model feature; Piper ignores it
        if input.reference_audio.is_some() || input.reference_text.is_some() {
            tracing::debug!("Ignoring reference audio/text for Piper");
        }

        self.run(&input.text, model_path)
    }
}
