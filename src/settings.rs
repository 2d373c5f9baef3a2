//! Game settings and preferences
//!
//! Persisted in LocalStorage on the web; native builds use defaults unless a
//! JSON file is supplied.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::geometry::Bounds;

/// Game settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Board ===
    /// Board size in pixels
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// How far the coin may drift from where it was aimed
    pub uncertainty_radius: f32,
    /// Half-size of a freshly placed rule
    pub initial_rule_radius: f32,

    // === Timing ===
    /// Coin flight animation before the toss resolves (ms)
    pub toss_flight_ms: f64,
    /// Optional per-turn time limit (ms); the turn is skipped when it runs
    /// out before the coin is tossed
    pub turn_time_limit_ms: Option<f64>,

    // === Audio ===
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0)
    pub sfx_volume: f32,
    pub muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,
            uncertainty_radius: UNCERTAINTY_RADIUS,
            initial_rule_radius: INITIAL_RULE_RADIUS,

            toss_flight_ms: TOSS_FLIGHT_MS,
            turn_time_limit_ms: None,

            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
        }
    }
}

impl Settings {
    /// Playable area
    pub fn bounds(&self) -> Bounds {
        Bounds::from_size(self.canvas_width, self.canvas_height)
    }

    /// Effective cue volume (respects mute)
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            (self.master_volume * self.sfx_volume).clamp(0.0, 1.0)
        }
    }

    /// Parse settings, filling anything missing with defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::validated)
    }

    /// Replace unusable values (non-finite, negative, empty board) with
    /// defaults
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        let positive = |v: f32| v.is_finite() && v > 0.0;

        if !positive(self.canvas_width) || !positive(self.canvas_height) {
            log::warn!(
                "Invalid board size {}x{}, using default",
                self.canvas_width,
                self.canvas_height
            );
            self.canvas_width = defaults.canvas_width;
            self.canvas_height = defaults.canvas_height;
        }
        if !(self.uncertainty_radius.is_finite() && self.uncertainty_radius >= 0.0) {
            log::warn!("Invalid uncertainty radius {}", self.uncertainty_radius);
            self.uncertainty_radius = defaults.uncertainty_radius;
        }
        if !positive(self.initial_rule_radius) {
            log::warn!("Invalid rule radius {}", self.initial_rule_radius);
            self.initial_rule_radius = defaults.initial_rule_radius;
        }
        if !(self.toss_flight_ms.is_finite() && self.toss_flight_ms >= 0.0) {
            log::warn!("Invalid toss flight time {}", self.toss_flight_ms);
            self.toss_flight_ms = defaults.toss_flight_ms;
        }
        if self
            .turn_time_limit_ms
            .is_some_and(|ms| !(ms.is_finite() && ms > 0.0))
        {
            log::warn!("Ignoring invalid turn time limit");
            self.turn_time_limit_ms = None;
        }
        if !self.master_volume.is_finite() {
            self.master_volume = defaults.master_volume;
        }
        if !self.sfx_volume.is_finite() {
            self.sfx_volume = defaults.sfx_volume;
        }
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.sfx_volume = self.sfx_volume.clamp(0.0, 1.0);
        self
    }

    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "flip_rules_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(settings) = Self::from_json(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings;
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Native: read a settings file if given, defaults otherwise
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var("FLIP_RULES_SETTINGS") else {
            return Self::default();
        };
        match std::fs::read_to_string(&path).map(|json| Self::from_json(&json)) {
            Ok(Ok(settings)) => {
                log::info!("Loaded settings from {}", path);
                settings
            }
            Ok(Err(e)) => {
                log::warn!("Bad settings file {}: {}", path, e);
                Self::default()
            }
            Err(e) => {
                log::warn!("Could not read {}: {}", path, e);
                Self::default()
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}
