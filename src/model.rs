//! Shared session documents
//!
//! Everything in here is replicated between clients. Field names follow the
//! camelCase layout of the hosted document store.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::join_names;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of one replicated game instance
    SessionId
);
string_id!(
    /// Identifier of a participant within a session
    PlayerId
);
string_id!(
    /// Identifier of a placed rule
    RuleId
);

/// Hot-seat on one device, or one tab per participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Local,
    Remote,
}

/// Fixed palette players draw their color from
pub const PLAYER_COLORS: [&str; 10] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe",
];

/// First palette color not already taken
pub fn choose_new_color(existing: &[&str]) -> Option<&'static str> {
    PLAYER_COLORS
        .iter()
        .copied()
        .find(|c| !existing.contains(c))
}

/// A participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    /// Only tracked for remote sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// A rule written onto the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    /// Author
    pub player_id: PlayerId,
    pub display_text: String,
    /// Serialized shape geometry (JSON)
    pub data: String,
    #[serde(default)]
    pub times_landed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    Text,
    RuleTriggered,
}

/// Modal shown after a toss resolves, until dismissed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
}

impl Alert {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Text,
            message: message.into(),
            rule_id: None,
        }
    }

    pub fn rule_triggered(rule_id: RuleId, message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::RuleTriggered,
            message: message.into(),
            rule_id: Some(rule_id),
        }
    }
}

/// The single game document of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: SessionId,
    pub current_player_id: PlayerId,
    pub is_player_busy: bool,
    pub has_flipped: bool,
    /// Where the coin landed (set once the toss resolves)
    pub quarter_location: Option<Vec2>,
    /// Where the in-flight indicator is shown
    pub indicator_location: Option<Vec2>,
    #[serde(rename = "type")]
    pub game_type: GameType,
    pub alert: Option<Alert>,
}

impl Game {
    pub fn new(id: SessionId, first_player: PlayerId, game_type: GameType) -> Self {
        Self {
            id,
            current_player_id: first_player,
            is_player_busy: false,
            has_flipped: false,
            quarter_location: None,
            indicator_location: None,
            game_type,
            alert: None,
        }
    }

    /// Merge a partial update (field-level last-write-wins)
    pub fn apply(&mut self, update: &GameUpdate) {
        if let Some(id) = &update.current_player_id {
            self.current_player_id = id.clone();
        }
        if let Some(busy) = update.is_player_busy {
            self.is_player_busy = busy;
        }
        if let Some(flipped) = update.has_flipped {
            self.has_flipped = flipped;
        }
        if let Some(loc) = update.quarter_location {
            self.quarter_location = loc;
        }
        if let Some(loc) = update.indicator_location {
            self.indicator_location = loc;
        }
        if let Some(alert) = &update.alert {
            self.alert = alert.clone();
        }
    }
}

/// Partial game document write. `None` leaves a field untouched; the
/// nested `Option` on nullable fields distinguishes "clear" from "skip".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_player_busy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_flipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarter_location: Option<Option<Vec2>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicator_location: Option<Option<Vec2>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Option<Alert>>,
}

impl GameUpdate {
    pub fn busy() -> Self {
        Self {
            is_player_busy: Some(true),
            ..Default::default()
        }
    }

    pub fn indicator(point: Vec2) -> Self {
        Self {
            indicator_location: Some(Some(point)),
            has_flipped: Some(true),
            ..Default::default()
        }
    }

    /// Everything a turn hand-off resets, in one write
    pub fn next_turn(next_player: PlayerId) -> Self {
        Self {
            current_player_id: Some(next_player),
            is_player_busy: Some(false),
            has_flipped: Some(false),
            quarter_location: Some(None),
            indicator_location: Some(None),
            ..Default::default()
        }
    }

    pub fn alert(alert: Option<Alert>) -> Self {
        Self {
            alert: Some(alert),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Narration entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    GameStart,
    NewPlayer,
    SkippedTurn,
    PanicSkip,
    Missed,
    RuleCreated,
    RuleTriggered,
    Custom,
}

/// One narration entry. The display string is derived on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub player_ids: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    pub fn new(kind: MessageKind, player_ids: Vec<PlayerId>) -> Self {
        Self {
            kind,
            player_ids,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn custom(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Custom, Vec::new()).with_text(text)
    }

    /// Render as narration, resolving player names through `players`
    pub fn display_string(&self, players: &[Player]) -> String {
        let names: Vec<&str> = self
            .player_ids
            .iter()
            .map(|id| {
                players
                    .iter()
                    .find(|p| &p.id == id)
                    .map(|p| p.name.as_str())
                    .unwrap_or("someone")
            })
            .collect();
        let first = names.first().copied().unwrap_or("someone");
        let text = self.text.as_deref().unwrap_or_default();

        match self.kind {
            MessageKind::GameStart => format!("Game started with {}.", join_names(&names)),
            MessageKind::NewPlayer => format!("{first} joined the game."),
            MessageKind::SkippedTurn => format!("{first} skipped their turn."),
            MessageKind::PanicSkip => format!("{first}'s turn was force-skipped."),
            MessageKind::Missed => format!("{first} missed the board."),
            MessageKind::RuleCreated => format!("{first} created a rule: {text}"),
            MessageKind::RuleTriggered => format!("{first} landed on: {text}"),
            MessageKind::Custom => text.to_string(),
        }
    }
}

/// Full document written once when a session is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub game: Game,
    pub players: Vec<Player>,
    pub rules: Vec<Rule>,
    pub messages: Vec<Message>,
}
