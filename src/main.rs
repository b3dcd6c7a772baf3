use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use speech_shim::tts::{Espeak, ModelEngine, OnnxPiperModel, PiperCli, SpeechEngine, SpeechService};
use speech_shim::{create_router, AppState, Backend, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.addr()?;
    let registry = config.voice_registry()?;

    tracing::info!("Speech Shim Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("Voices directory: {}", config.voices_dir.display());

    let engine: Arc<dyn SpeechEngine> = match config.backend {
        Backend::PiperCli => {
            let piper = PiperCli::new(config.piper_bin.clone(), config.scratch_dir.clone());
            if piper.is_available() {
                tracing::info!("Piper binary found at {}", piper.binary().display());
            } else {
                tracing::warn!(
                    "Piper binary not found at {}; speech generation will fail",
                    piper.binary().display()
                );
            }
            Arc::new(piper)
        }
        Backend::Model => {
            let voices_dir = config.voices_dir.clone();
            let voice_id = config.model_voice.clone();
            let espeak = Espeak::new(config.espeak_bin.clone());
            Arc::new(ModelEngine::load(format!("Piper ONNX ({})", voice_id), move || {
                OnnxPiperModel::load(&voices_dir, &voice_id, espeak)
            }))
        }
    };

    let mut speech = SpeechService::new(engine, registry, config.voices_dir.clone())
        .with_default_voice(config.default_voice.clone());
    if let Some(max) = config.max_text_chars {
        speech = speech.with_max_text_chars(max);
    }

    if !config.voices_dir.is_dir() {
        tracing::warn!("Voices directory not found at {}", config.voices_dir.display());
    } else {
        let installed = speech.installed_voices();
        tracing::info!("Found {} voice models", installed.len());
        for voice in &installed {
            tracing::info!("  - {}", voice);
        }
    }

    let state = Arc::new(AppState { speech });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
