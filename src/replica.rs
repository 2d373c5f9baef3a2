//! Local replica of a shared session
//!
//! `SessionReplica` is the only writer of the replicated documents. Every
//! other component reads its mirrors and asks it to publish changes.
//!
//! Writes are optimistic: the local mirror changes first, then the store is
//! told. Remote deltas arrive through the subscription and are applied by
//! [`SessionReplica::pump`] in arrival order, overwriting whatever the local
//! mirror held. Nothing is versioned, so a stale delta can undo a newer
//! local write until the next delta arrives.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use thiserror::Error;

use crate::geometry::Shape;
use crate::messages::MessageLog;
use crate::model::{
    Game, GameType, GameUpdate, Message, MessageKind, PLAYER_COLORS, Player, PlayerId, Rule,
    RuleId, SessionData, SessionId, choose_new_color,
};
use crate::rules::{RuleError, RuleRegistry};
use crate::store::{Child, Delta, DocumentStore, StoreError, Subscription};

/// Fewest players a session can start with
pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    #[error("a session needs at least {} players", MIN_PLAYERS)]
    TooFewPlayers,

    #[error("the color palette only fits {} players", PLAYER_COLORS.len())]
    TooManyPlayers,

    #[error("player name is empty")]
    EmptyName,

    #[error("no session is connected")]
    NotConnected,

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ReplicaError>;

type Listener = Box<dyn FnMut(&Delta)>;

pub struct SessionReplica<S: DocumentStore> {
    store: S,
    session_id: Option<SessionId>,
    subscription: Option<Subscription>,
    local_player_id: Option<PlayerId>,
    game: Option<Game>,
    players: Vec<Player>,
    rules: RuleRegistry,
    /// Store order once connected, so every client reads the same log
    messages: MessageLog,
    listeners: Vec<Listener>,
    rng: Pcg32,
}

impl<S: DocumentStore> SessionReplica<S> {
    /// `seed` drives id generation and color shuffling
    pub fn new(store: S, seed: u64) -> Self {
        Self {
            store,
            session_id: None,
            subscription: None,
            local_player_id: None,
            game: None,
            players: Vec::new(),
            rules: RuleRegistry::new(),
            messages: MessageLog::new(),
            listeners: Vec::new(),
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    fn new_id(&mut self, prefix: &str) -> String {
        format!(
            "{prefix}-{:08x}{:04x}",
            self.rng.random::<u32>(),
            self.rng.random::<u16>()
        )
    }

    fn reset_mirrors(&mut self) {
        self.game = None;
        self.players.clear();
        self.rules = RuleRegistry::new();
        self.messages = MessageLog::new();
    }

    // === Session lifecycle ===

    /// Seed a brand new session in one write and connect to it
    ///
    /// In remote mode the player named `local_name` becomes this client's
    /// participant and starts active; everyone else starts inactive until
    /// their own tab connects.
    pub fn create_session<N: AsRef<str>>(
        &mut self,
        names: &[N],
        local_name: Option<&str>,
        game_type: GameType,
    ) -> Result<SessionId> {
        if names.len() < MIN_PLAYERS {
            return Err(ReplicaError::TooFewPlayers);
        }
        if names.len() > PLAYER_COLORS.len() {
            return Err(ReplicaError::TooManyPlayers);
        }
        if names.iter().any(|n| n.as_ref().trim().is_empty()) {
            return Err(ReplicaError::EmptyName);
        }

        let session_id = SessionId(self.new_id("game"));
        let mut colors = PLAYER_COLORS;
        colors.shuffle(&mut self.rng);

        let mut local_player_id = None;
        let mut players = Vec::with_capacity(names.len());
        for (name, color) in names.iter().zip(colors) {
            let name = name.as_ref().trim();
            let id = PlayerId(self.new_id("player"));
            let is_active = match game_type {
                GameType::Local => None,
                GameType::Remote => {
                    let is_local = local_player_id.is_none() && Some(name) == local_name;
                    if is_local {
                        local_player_id = Some(id.clone());
                    }
                    Some(is_local)
                }
            };
            players.push(Player {
                id,
                name: name.to_string(),
                color: color.to_string(),
                is_active,
            });
        }

        let data = SessionData {
            game: Game::new(session_id.clone(), players[0].id.clone(), game_type),
            messages: vec![Message::new(
                MessageKind::GameStart,
                players.iter().map(|p| p.id.clone()).collect(),
            )],
            players,
            rules: Vec::new(),
        };

        self.reset_mirrors();
        self.subscription = Some(self.store.subscribe(&session_id)?);
        self.session_id = Some(session_id.clone());
        self.local_player_id = local_player_id;
        self.store.set_session(&session_id, &data)?;
        self.pump();

        log::info!(
            "Created {:?} session {} with {} players",
            game_type,
            session_id,
            data.players.len()
        );
        Ok(session_id)
    }

    /// Connect to an existing session without writing anything
    pub fn join_session(
        &mut self,
        session_id: SessionId,
        local_player_id: Option<PlayerId>,
    ) -> Result<()> {
        self.reset_mirrors();
        self.subscription = Some(self.store.subscribe(&session_id)?);
        self.session_id = Some(session_id.clone());
        self.local_player_id = local_player_id;
        self.pump();

        if self.game.is_none() {
            log::warn!("Joined session {} but it has no game yet", session_id);
        } else {
            log::info!("Joined session {}", session_id);
        }
        Ok(())
    }

    /// Register a listener for remote deltas, called during [`pump`](Self::pump)
    pub fn subscribe(&mut self, listener: impl FnMut(&Delta) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Apply every delta delivered so far. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let Some(subscription) = &self.subscription else {
            return 0;
        };
        let deltas = subscription.drain();
        for delta in &deltas {
            self.apply_delta(delta.clone());
            for listener in &mut self.listeners {
                listener(delta);
            }
        }
        deltas.len()
    }

    fn apply_delta(&mut self, delta: Delta) {
        match delta {
            Delta::GameReplaced(game) => self.game = Some(game),
            Delta::PlayerAdded(player) | Delta::PlayerChanged(player) => {
                match self.players.iter_mut().find(|p| p.id == player.id) {
                    Some(existing) => *existing = player,
                    None => self.players.push(player),
                }
            }
            Delta::RuleAdded(rule) | Delta::RuleChanged(rule) => self.rules.upsert(rule),
            Delta::MessageAdded(message) => self.messages.append(message, &self.players),
        }
    }

    /// Best-effort disconnect: mark the local participant inactive and stop
    /// listening. Errors are logged, never returned.
    pub fn teardown(&mut self) {
        if let (Some(session), Some(local), Some(GameType::Remote)) = (
            self.session_id.as_ref(),
            self.local_player_id.as_ref(),
            self.game.as_ref().map(|g| g.game_type),
        ) {
            let result = self
                .store
                .find_player(session, local)
                .and_then(|found| match found {
                    Some((key, _)) => self.store.set_player_active(session, &key, false),
                    None => Ok(()),
                });
            if let Err(e) = result {
                log::warn!("Could not mark {} inactive: {}", local, e);
            }
        }
        self.subscription = None;
        log::info!("Replica torn down");
    }

    // === Mutations ===

    /// Merge fields into the shared game document
    ///
    /// Last-write-wins per field. Before a session is connected this is a
    /// silent no-op.
    pub fn mutate(&mut self, update: GameUpdate) -> Result<()> {
        let Some(session) = &self.session_id else {
            log::debug!("Dropping game update, no session: {:?}", update);
            return Ok(());
        };
        if update.is_empty() {
            return Ok(());
        }
        if let Some(game) = self.game.as_mut() {
            game.apply(&update);
        }
        if let Err(e) = self.store.update_game(session, &update) {
            log::warn!("Game update failed, local state may diverge: {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Append a narration message
    ///
    /// Once connected the message shows up locally when the store delivers
    /// it back, in the same position every other client sees.
    pub fn create_message(&mut self, message: Message) -> Result<()> {
        match &self.session_id {
            Some(session) => {
                self.store.push(session, Child::Message(message))?;
            }
            None => self.messages.append(message, &self.players),
        }
        Ok(())
    }

    /// Publish a new rule authored by the current player
    pub fn create_rule(&mut self, shape: Shape, text: &str) -> Result<Rule> {
        let author = self
            .game
            .as_ref()
            .map(|g| g.current_player_id.clone())
            .ok_or(ReplicaError::NotConnected)?;
        let id = RuleId(self.new_id("rule"));
        let rule = self.rules.create_rule(id, shape, author.clone(), text)?;

        if let Some(session) = &self.session_id {
            self.store.push(session, Child::Rule(rule.clone()))?;
        }
        self.create_message(
            Message::new(MessageKind::RuleCreated, vec![author]).with_text(&rule.display_text),
        )?;
        log::info!("Rule {} created: {}", rule.id, rule.display_text);
        Ok(rule)
    }

    /// Count another landing on `rule_id`
    ///
    /// The store key is looked up by id first. Unknown rules are ignored.
    pub fn add_count_for_rule(&mut self, rule_id: &RuleId) -> Result<()> {
        self.rules.increment_landing(rule_id);
        let Some(session) = &self.session_id else {
            return Ok(());
        };
        match self.store.find_rule(session, rule_id)? {
            Some((key, remote)) => {
                self.store
                    .set_times_landed(session, &key, remote.times_landed + 1)?;
            }
            None => log::debug!("Rule {} not found in store", rule_id),
        }
        Ok(())
    }

    /// Late join: add a player with the next free color
    pub fn create_player(&mut self, name: &str) -> Result<PlayerId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ReplicaError::EmptyName);
        }
        let game_type = self
            .game
            .as_ref()
            .map(|g| g.game_type)
            .ok_or(ReplicaError::NotConnected)?;
        let taken: Vec<&str> = self.players.iter().map(|p| p.color.as_str()).collect();
        let color = choose_new_color(&taken).ok_or(ReplicaError::TooManyPlayers)?;

        let player = Player {
            id: PlayerId(self.new_id("player")),
            name: name.to_string(),
            color: color.to_string(),
            is_active: (game_type == GameType::Remote).then_some(false),
        };
        if let Some(session) = &self.session_id {
            self.store.push(session, Child::Player(player.clone()))?;
        }
        let id = player.id.clone();
        if !self.players.iter().any(|p| p.id == id) {
            self.players.push(player);
        }
        self.create_message(Message::new(MessageKind::NewPlayer, vec![id.clone()]))?;
        log::info!("Player {} joined as {}", name, id);
        Ok(id)
    }

    // === Reads ===

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn local_player_id(&self) -> Option<&PlayerId> {
        self.local_player_id.as_ref()
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    /// Players in session order
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.game.as_ref().and_then(|g| self.player(&g.current_player_id))
    }

    /// Name for narration, falling back when the player is unknown locally
    pub fn player_name(&self, id: &PlayerId) -> &str {
        self.player(id).map(|p| p.name.as_str()).unwrap_or("Someone")
    }

    /// Whether this client may act for the current player: always in local
    /// games, only as the current player in remote ones
    pub fn is_local_turn(&self) -> bool {
        match self.game.as_ref() {
            Some(game) => match game.game_type {
                GameType::Local => true,
                GameType::Remote => self.local_player_id.as_ref() == Some(&game.current_player_id),
            },
            None => false,
        }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Invite link for remote sessions
    pub fn share_link(&self, base_url: &str) -> Option<String> {
        let game = self.game.as_ref()?;
        (game.game_type == GameType::Remote).then(|| format!("{base_url}/?join={}", game.id))
    }
}
