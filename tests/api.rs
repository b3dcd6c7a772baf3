use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use speech_shim::tts::{
    wav, ModelEngine, SpeechEngine, SpeechModel, SpeechService, SynthesisInput, VoiceRegistry,
};
use speech_shim::{create_router, AppError, AppState};

struct CountingEngine {
    available: bool,
    calls: Arc<AtomicUsize>,
}

impl SpeechEngine for CountingEngine {
    fn name(&self) -> &str {
        "Counting"
    }

    fn uses_voices(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn synthesize(&self, input: &SynthesisInput) -> Result<Vec<u8>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.model_path.as_deref().map(Path::is_file).unwrap_or(false));
        wav::samples_to_wav(&[0.1, -0.1, 0.2, -0.2], 22050)
    }
}

struct SilenceModel;

impl SpeechModel for SilenceModel {
    fn infer(
        &self,
        _text: &str,
        _reference_audio: Option<&Path>,
        _reference_text: Option<&str>,
    ) -> Result<(Vec<f32>, u32), AppError> {
        Ok((vec![0.0; 240], 24000))
    }
}

struct Fixture {
    app: Router,
    calls: Arc<AtomicUsize>,
    _voices: tempfile::TempDir,
}

fn voice_app(available: bool, models: &[&str]) -> Fixture {
    let voices = tempfile::tempdir().unwrap();
    for model in models {
        std::fs::write(voices.path().join(model), b"onnx").unwrap();
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let engine = CountingEngine {
        available,
        calls: Arc::clone(&calls),
    };
    let speech = SpeechService::new(
        Arc::new(engine),
        VoiceRegistry::default(),
        voices.path().to_path_buf(),
    );

    Fixture {
        app: create_router(Arc::new(AppState { speech })),
        calls,
        _voices: voices,
    }
}

fn model_app(model: Option<SilenceModel>) -> Router {
    let engine = ModelEngine::new("Silence", model);
    let speech = SpeechService::new(
        Arc::new(engine),
        VoiceRegistry::default(),
        "/no/voices".into(),
    );
    create_router(Arc::new(AppState { speech }))
}

fn generate(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate-speech")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_generate_speech_returns_wav() {
    let fixture = voice_app(true, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": "Hello", "voice": "danny-low"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=speech.wav"
    );
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-audio-sample-rate"], "22050");
    assert_eq!(headers["x-audio-channels"], "1");
    assert_eq!(headers["x-voice"], "danny-low");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"RIFF"));
    assert_eq!(&bytes[8..12], b"WAVE");
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_voice_falls_back_to_default() {
    let fixture = voice_app(true, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": "Hello", "voice": ""})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-voice"], "danny-low");
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_long_text_is_not_capped_by_default() {
    let fixture = voice_app(true, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": "a".repeat(10_001)})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_text_is_bad_request() {
    let fixture = voice_app(true, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": ""})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Text cannot be empty");
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_voice_lists_available() {
    let fixture = voice_app(true, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": "Hi", "voice": "nonexistent"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("Available voices"));
    assert!(detail.contains("danny-low"));
    assert!(detail.contains("ljspeech-high"));
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_model_is_not_found() {
    let fixture = voice_app(true, &[]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": "Hi", "voice": "amy-medium"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unavailable_engine_is_503() {
    let fixture = voice_app(false, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"text": "Hi"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let fixture = voice_app(true, &["en_US-danny-low.onnx"]);

    let response = fixture
        .app
        .oneshot(generate(json!({"voice": "danny-low"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_list_voices_reports_availability() {
    let fixture = voice_app(true, &["en_US-ryan-high.onnx"]);

    let response = fixture.app.oneshot(get("/voices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 5);
    let voices = body["voices"].as_array().unwrap();
    assert_eq!(voices.len(), 5);
    for voice in voices {
        let expected = voice["name"] == "ryan-high";
        assert_eq!(voice["available"], expected, "{}", voice);
    }
}

#[tokio::test]
async fn test_health_degraded_without_engine() {
    let fixture = voice_app(false, &["en_US-danny-low.onnx"]);

    let response = fixture.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["piper_available"], false);
    assert_eq!(body["voices_directory"], true);
    assert_eq!(body["voices_loaded"], json!(["en_US-danny-low"]));
    assert_eq!(body["default_voice"], "danny-low");
}

#[tokio::test]
async fn test_health_healthy() {
    let fixture = voice_app(true, &[]);

    let body = body_json(fixture.app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["voices_loaded"], json!([]));
}

#[tokio::test]
async fn test_root_metadata() {
    let fixture = voice_app(true, &[]);

    let body = body_json(fixture.app.oneshot(get("/")).await.unwrap()).await;
    assert_eq!(body["status"], "running");
    assert_eq!(body["engine"], "Counting");
    assert_eq!(body["default_voice"], "danny-low");
    assert_eq!(body["endpoints"]["voices"], "/voices");
    assert_eq!(body["endpoints"]["generate"], "/generate-speech");
}

#[tokio::test]
async fn test_model_backend_generates_without_voice() {
    let app = model_app(Some(SilenceModel));

    let response = app
        .oneshot(generate(json!({
            "text": "Hello there",
            "reference_audio": "/refs/speaker.wav",
            "reference_text": "Reference words"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-audio-sample-rate"], "24000");
    assert!(response.headers().get("x-voice").is_none());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let format = wav::inspect(&bytes).unwrap();
    assert_eq!(format.sample_rate, 24000);
}

#[tokio::test]
async fn test_model_backend_not_loaded() {
    let app = model_app(None);

    let response = app
        .clone()
        .oneshot(generate(json!({"text": "Hello"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Model not loaded");

    let body = body_json(app.oneshot(get("/")).await.unwrap()).await;
    assert_eq!(body["status"], "model not loaded");
    assert!(body.get("default_voice").is_none());
}

#[tokio::test]
async fn test_model_backend_has_no_voice_listing() {
    let app = model_app(Some(SilenceModel));

    let response = app.clone().oneshot(get("/voices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "Silence");
    assert_eq!(body["ready"], true);
}
