use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const DEFAULT_VOICE: &str = "danny-low";

/// One entry of the voice catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoiceEntry {
    pub name: String,
    pub model_file: String,
    pub gender: String,
    pub quality: String,
}

impl VoiceEntry {
    fn new(name: &str, model_file: &str, gender: &str, quality: &str) -> Self {
        Self {
            name: name.to_string(),
            model_file: model_file.to_string(),
            gender: gender.to_string(),
            quality: quality.to_string(),
        }
    }
}

/// A registry entry with its availability resolved against a voices directory.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceDescriptor {
    pub name: String,
    pub model_file: String,
    pub gender: String,
    pub quality: String,
    pub available: bool,
}

/// Read-only catalog of named voices, keyed by voice name.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    voices: BTreeMap<String, VoiceEntry>,
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        let voices = [
            VoiceEntry::new("danny-low", "en_US-danny-low.onnx", "male", "low"),
            VoiceEntry::new("ryan-high", "en_US-ryan-high.onnx", "male", "high"),
            VoiceEntry::new("lessac-medium", "en_US-lessac-medium.onnx", "female", "medium"),
            VoiceEntry::new("amy-medium", "en_US-amy-medium.onnx", "female", "medium"),
            VoiceEntry::new("ljspeech-high", "en_US-ljspeech-high.onnx", "female", "high"),
        ]
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect();

        Self { voices }
    }
}

impl VoiceRegistry {
    pub fn from_entries(entries: Vec<VoiceEntry>) -> Result<Self, AppError> {
        let mut voices = BTreeMap::new();
        for entry in entries {
            if entry.name.trim().is_empty() {
                return Err(AppError::InvalidInput("Voice name cannot be empty".into()));
            }
            if let Some(previous) = voices.insert(entry.name.clone(), entry) {
                return Err(AppError::InvalidInput(format!(
                    "Duplicate voice '{}' in registry",
                    previous.name
                )));
            }
        }
        Ok(Self { voices })
    }

    /// Load a registry from a JSON array of voice entries.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let entries: Vec<VoiceEntry> = serde_json::from_reader(File::open(path)?)?;
        Self::from_entries(entries)
    }

    pub fn get(&self, name: &str) -> Option<&VoiceEntry> {
        self.voices.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.voices.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Resolve every entry's availability against the model files in `voices_dir`.
    pub fn describe(&self, voices_dir: &Path) -> Vec<VoiceDescriptor> {
        let installed = installed_models(voices_dir);
        self.voices
            .values()
            .map(|entry| VoiceDescriptor {
                name: entry.name.clone(),
                model_file: entry.model_file.clone(),
                gender: entry.gender.clone(),
                quality: entry.quality.clone(),
                available: installed.contains(&entry.model_file),
            })
            .collect()
    }
}

/// File names of the `.onnx` models present in `voices_dir`. A missing or
/// unreadable directory yields an empty set.
pub fn installed_models(voices_dir: &Path) -> HashSet<String> {
    let Ok(entries) = std::fs::read_dir(voices_dir) else {
        return HashSet::new();
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().map(|e| e == "onnx").unwrap_or(false))
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}

/// Contents of a Piper `<voice>.onnx.json` file, the parts synthesis reads.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub espeak: Option<EspeakConfig>,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    pub voice: String,
}

/// VITS sampling knobs; any field missing from the file keeps Piper's default.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_w: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: 0.667,
            length_scale: 1.0,
            noise_w: 0.8,
        }
    }
}

impl InferenceConfig {
    pub fn scales(&self) -> Vec<f32> {
        vec![self.noise_scale, self.length_scale, self.noise_w]
    }
}

impl VoiceConfig {
    pub fn espeak_voice(&self) -> &str {
        self.espeak.as_ref().map(|e| e.voice.as_str()).unwrap_or("en")
    }

    /// Model input ids for an IPA string: BOS, each known phoneme followed by
    /// the pad id, then EOS. Unmapped phonemes contribute only padding.
    pub fn phoneme_ids(&self, phonemes: &str) -> Vec<i64> {
        let map = &self.phoneme_id_map;
        let marker = |key: &str| map.get(key).cloned().unwrap_or_else(|| vec![0]);
        let pad = map.get("_").map(Vec::as_slice).unwrap_or_default();

        let mut ids = marker("^");
        let mut buf = [0u8; 4];
        for ch in phonemes.chars() {
            if let Some(mapped) = map.get(&*ch.encode_utf8(&mut buf)) {
                ids.extend_from_slice(mapped);
            }
            ids.extend_from_slice(pad);
        }
        ids.extend(marker("$"));
        ids
    }
}

/// A Piper ONNX voice on disk: `<id>.onnx` plus its `<id>.onnx.json` config.
#[derive(Debug)]
pub struct PiperVoice {
    pub id: String,
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl PiperVoice {
    pub fn load(voices_dir: &Path, voice_id: &str) -> Result<Self, AppError> {
        let model_path = voices_dir.join(format!("{}.onnx", voice_id));
        if !model_path.is_file() {
            return Err(AppError::NotFound(format!(
                "Voice model not found: {}",
                model_path.display()
            )));
        }

        let mut config_path = model_path.clone().into_os_string();
        config_path.push(".json");
        let config_path = PathBuf::from(config_path);
        if !config_path.is_file() {
            return Err(AppError::NotFound(format!(
                "Voice config not found: {}",
                config_path.display()
            )));
        }

        let config: VoiceConfig = serde_json::from_reader(File::open(&config_path)?)?;

        Ok(Self {
            id: voice_id.to_string(),
            config,
            model_path,
        })
    }
}
