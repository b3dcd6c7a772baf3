pub mod handlers;
pub mod routes;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::tts::VoiceDescriptor;

pub use crate::tts::SpeechRequest;

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceDescriptor>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub engine: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

/// Health of a voice-backed engine.
#[derive(Debug, Serialize)]
pub struct VoiceHealthResponse {
    pub status: String,
    #[serde(rename = "piper_available")]
    pub engine_available: bool,
    pub voices_directory: bool,
    pub voices_loaded: Vec<String>,
    pub default_voice: String,
}

/// Health of a model-backed engine.
#[derive(Debug, Serialize)]
pub struct ModelHealthResponse {
    pub status: String,
    pub model: String,
    pub ready: bool,
}
