use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    ModelHealthResponse, ServiceInfo, SpeechRequest, VoiceHealthResponse, VoicesResponse,
};
use crate::api::routes::AppState;
use crate::error::AppError;

pub async fn generate_speech(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    let result = state.speech.generate_speech(request).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=speech.wav"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-audio-sample-rate", HeaderValue::from(result.format.sample_rate));
    headers.insert("x-audio-channels", HeaderValue::from(result.format.channels));
    // Registry names are operator-supplied; skip any that can't be a header
    if let Some(voice) = result.voice.as_deref() {
        if let Ok(value) = HeaderValue::from_str(voice) {
            headers.insert("x-voice", value);
        }
    }

    Ok((headers, result.audio).into_response())
}

pub async fn list_voices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VoicesResponse>, AppError> {
    let voices = state.speech.list_voices()?;
    Ok(Json(VoicesResponse {
        count: voices.len(),
        voices,
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let speech = &state.speech;
    let engine = speech.engine();
    let engine_available = engine.is_available();

    let Some(default_voice) = speech.default_voice() else {
        if !engine_available {
            return Err(AppError::ServiceUnavailable("Model not loaded".into()));
        }
        return Ok(Json(ModelHealthResponse {
            status: "healthy".to_string(),
            model: engine.name().to_string(),
            ready: true,
        })
        .into_response());
    };

    Ok(Json(VoiceHealthResponse {
        status: if engine_available { "healthy" } else { "degraded" }.to_string(),
        engine_available,
        voices_directory: speech.voices_dir().is_dir(),
        voices_loaded: speech.installed_voices(),
        default_voice: default_voice.to_string(),
    })
    .into_response())
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    let speech = &state.speech;
    let engine = speech.engine();
    let uses_voices = engine.uses_voices();

    let mut endpoints = BTreeMap::new();
    endpoints.insert("health", "/health");
    endpoints.insert("generate", "/generate-speech");
    if uses_voices {
        endpoints.insert("voices", "/voices");
    }

    let status = if uses_voices || engine.is_available() {
        "running"
    } else {
        "model not loaded"
    };

    Json(ServiceInfo {
        service: "Speech Shim Server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine.name().to_string(),
        status: status.to_string(),
        default_voice: speech.default_voice().map(String::from),
        endpoints,
    })
}
