//! Flip Rules - a coin flip party game on a shared board
//!
//! Players take turns tossing a coin onto the board. Landing on empty space
//! lets the player write a new rule there; landing inside an existing rule
//! triggers it; missing the board is its own penalty.
//!
//! Core modules:
//! - `geometry`: Pure toss geometry (approach point, jitter, bounds, overlap)
//! - `rules`: Placed rules and point lookup
//! - `messages`: Append-only narration log
//! - `turn`: Turn/toss state machine
//! - `replica`: Local mirror of the shared session document
//! - `store`: Replicated document store interface and in-memory backend
//! - `settings`: Player-tunable configuration
//! - `platform`: Clock, seeding and page hooks
//! - `audio`, `web`: Browser-only cue playback and bindings

pub mod geometry;
pub mod messages;
pub mod model;
pub mod platform;
pub mod replica;
pub mod rules;
pub mod settings;
pub mod store;
pub mod turn;

#[cfg(target_arch = "wasm32")]
pub mod audio;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use geometry::{Bounds, Shape};
pub use messages::MessageLog;
pub use model::{Alert, AlertKind, Game, GameType, Message, MessageKind, Player, Rule};
pub use model::{PlayerId, RuleId, SessionId};
pub use replica::{ReplicaError, SessionReplica};
pub use rules::{RuleError, RuleRegistry};
pub use settings::Settings;
pub use store::{DocumentStore, MemoryStore, StoreError};
pub use turn::{SoundCue, TossOutcome, TurnController, TurnEffect, TurnError, TurnPhase};

/// Game configuration constants
pub mod consts {
    /// Default board dimensions (pixels)
    pub const CANVAS_WIDTH: f32 = 500.0;
    pub const CANVAS_HEIGHT: f32 = 500.0;

    /// Maximum distance the coin drifts from its approach point
    pub const UNCERTAINTY_RADIUS: f32 = 60.0;

    /// Half-size of the square a new rule starts as
    pub const INITIAL_RULE_RADIUS: f32 = 10.0;

    /// Extra padding when testing rule overlap, so touching shapes collide
    pub const OVERLAP_MARGIN: f32 = 1.0;

    /// Simulated coin flight time between indicator and landing (ms)
    pub const TOSS_FLIGHT_MS: f64 = 2500.0;

    /// Smallest allowed side length for a resized rule shape
    pub const MIN_RULE_SIZE: f32 = 8.0;
}

/// Join names for narration: "A", "A and B", "A, B and C"
pub fn join_names<S: AsRef<str>>(names: &[S]) -> String {
    match names {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|n| n.as_ref()).collect();
            format!("{} and {}", head.join(", "), last.as_ref())
        }
    }
}
