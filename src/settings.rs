use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::challenge::generator::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::scoring::distractions::{DEFAULT_DISTRACTION_LABELS, DEFAULT_MIN_DISTRACTION_CONFIDENCE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerificationSettings {
    pub detection_interval_ms: u64,
    pub inference_timeout_ms: u64,
    pub random_check_interval_secs: u64,
    pub random_check_probability: f64,
    /// Consecutive ticks below the warning threshold that force a challenge.
    pub low_score_challenge_ticks: Option<u32>,
    pub difficulty: u8,
    pub distraction_labels: Vec<String>,
    pub min_distraction_confidence: f32,
    pub rng_seed: Option<u64>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            detection_interval_ms: 3000,
            inference_timeout_ms: 2500,
            random_check_interval_secs: 45,
            random_check_probability: 0.15,
            low_score_challenge_ticks: Some(3),
            difficulty: 1,
            distraction_labels: DEFAULT_DISTRACTION_LABELS.iter().map(|s| s.to_string()).collect(),
            min_distraction_confidence: DEFAULT_MIN_DISTRACTION_CONFIDENCE,
            rng_seed: None,
        }
    }
}

impl VerificationSettings {
    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms.max(1))
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms.max(1))
    }

    pub fn random_check_interval(&self) -> Duration {
        Duration::from_secs(self.random_check_interval_secs.max(1))
    }

    /// Clamps out-of-range values from hand-edited files.
    pub fn normalized(mut self) -> Self {
        self.random_check_probability = self.random_check_probability.clamp(0.0, 1.0);
        self.difficulty = self.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        self.min_distraction_confidence = self.min_distraction_confidence.clamp(0.0, 1.0);
        self
    }

    /// `FOCUSGUARD_SEED` pins the random generators; `FOCUSGUARD_DEBUG`
    /// rolls for a random check on every detection tick.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(seed) = std::env::var("FOCUSGUARD_SEED") {
            match seed.parse::<u64>() {
                Ok(seed) => self.rng_seed = Some(seed),
                Err(_) => warn!("ignoring non-numeric FOCUSGUARD_SEED '{seed}'"),
            }
        }

        let debug_mode = std::env::var("FOCUSGUARD_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.random_check_interval_secs = (self.detection_interval_ms / 1000).max(1);
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<VerificationSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<VerificationSettings>(&contents)
                .unwrap_or_else(|err| {
                    warn!("settings at {} are unreadable, using defaults: {err}", path.display());
                    VerificationSettings::default()
                })
                .normalized()
        } else {
            VerificationSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn verification(&self) -> VerificationSettings {
        self.read().clone()
    }

    pub fn update_verification(&self, settings: VerificationSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings.normalized();
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: VerificationSettings = serde_json::from_str(&contents)?;
        *self.write() = data.normalized();
        Ok(())
    }

    fn persist(&self, data: &VerificationSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, VerificationSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, VerificationSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.verification();
        assert_eq!(settings.detection_interval_ms, 3000);
        assert_eq!(settings.random_check_interval_secs, 45);
        assert_eq!(settings.random_check_probability, 0.15);
        assert_eq!(settings.low_score_challenge_ticks, Some(3));
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.verification();
        settings.difficulty = 9;
        settings.rng_seed = Some(7);
        store.update_verification(settings).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        let loaded = reopened.verification();
        assert_eq!(loaded.difficulty, MAX_DIFFICULTY);
        assert_eq!(loaded.rng_seed, Some(7));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "detection_interval_ms": 1000 }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().verification();
        assert_eq!(settings.detection_interval_ms, 1000);
        assert_eq!(settings.difficulty, 1);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.verification(), VerificationSettings::default());
        assert!(store.reload().is_err());
    }
}
