//! Turn and toss state machine
//!
//! ```text
//! Idle(p) ─begin_turn─▶ Tossing(p) ─record_approach─▶ IndicatorShown(p)
//!    ▲                                                     │ flight timer
//!    │                                                     ▼
//!    └──advance_turn── Resolved(p, miss | rule) ◀──────── resolve
//!    └──submit_rule─── AwaitingRule(p) ◀──────────────── (empty spot)
//! ```
//!
//! The state lives in the shared game document, so the phase is derived from
//! it rather than stored here. The controller only keeps what is local to the
//! acting client: the RNG, the approach point, the pending rule shape and the
//! two timers.
//!
//! Nothing here is atomic across clients. Two clients that both read
//! `isPlayerBusy == false` can both begin a turn; the second write simply
//! lands on top of the first.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::Serialize;
use thiserror::Error;

use crate::consts::OVERLAP_MARGIN;
use crate::geometry::{self, Bounds, Shape};
use crate::model::{Alert, AlertKind, GameUpdate, Message, MessageKind, PlayerId, Rule, RuleId};
use crate::replica::{ReplicaError, SessionReplica};
use crate::settings::Settings;
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("no game is loaded")]
    NoGame,

    #[error("the session has no players")]
    NoPlayers,

    #[error("it is not this participant's turn")]
    NotAuthorized,

    #[error("the current player is already busy")]
    PlayerBusy,

    #[error("no toss has been started")]
    NotTossing,

    #[error("the coin is already in the air")]
    AlreadyFlipped,

    #[error("no toss is in flight")]
    NotInFlight,

    #[error("no rule is waiting to be written")]
    NothingPending,

    #[error("rule text is empty")]
    EmptyRuleText,

    #[error("the rule shape overlaps another rule")]
    ShapeIntersects,

    #[error("there is no alert to dismiss")]
    NoAlert,

    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

pub type Result<T> = std::result::Result<T, TurnError>;

/// Audio cues the controller asks the front end to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SoundCue {
    /// Coin leaves the hand
    Flip,
    /// Coin lands on empty space
    Land,
    /// Coin misses the board
    Miss,
    /// Coin lands on an existing rule
    RuleTriggered,
    /// A new rule is written
    RuleCreated,
    /// Next player's turn
    TurnChange,
}

/// How a toss ended
#[derive(Debug, Clone, PartialEq)]
pub enum TossOutcome {
    /// Off the board
    Miss,
    /// Landed on (or against) an existing rule
    RuleTriggered(RuleId),
    /// Landed on free space; waiting for rule text
    NewRuleEligible { point: Vec2, shape: Shape },
}

/// Where the current turn stands, derived from the game document
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPhase {
    Idle(PlayerId),
    Tossing(PlayerId),
    IndicatorShown(PlayerId),
    AwaitingRule(PlayerId),
    Resolved(PlayerId, TossOutcome),
}

/// Commands for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TurnEffect {
    PlaySound(SoundCue),
    ShowIndicator(Vec2),
    HideIndicator,
    /// Ask the acting player to write a rule in this shape
    PromptForRule(Shape),
    RenderShape(Shape),
    ShowAlert(Alert),
    TurnAdvanced(PlayerId),
    /// The turn time limit ran out
    TurnTimeExpired(PlayerId),
}

/// A deadline on the `now_ms` clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    deadline_ms: f64,
}

impl Countdown {
    pub fn start(now_ms: f64, duration_ms: f64) -> Self {
        Self {
            deadline_ms: now_ms + duration_ms.max(0.0),
        }
    }

    pub fn is_due(&self, now_ms: f64) -> bool {
        now_ms >= self.deadline_ms
    }

    pub fn remaining_ms(&self, now_ms: f64) -> f64 {
        (self.deadline_ms - now_ms).max(0.0)
    }
}

/// Rule shape waiting for its text
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRule {
    point: Vec2,
    /// Square first placed at the landing point
    base: Shape,
    /// After any resizing by the author
    shape: Shape,
    intersecting: bool,
}

pub struct TurnController {
    rng: Pcg32,
    bounds: Bounds,
    uncertainty_radius: f32,
    rule_radius: f32,
    flight_ms: f64,
    turn_limit_ms: Option<f64>,
    /// Running between indicator and landing, for the player who tossed
    flight: Option<(PlayerId, Countdown)>,
    /// Running while the named player has not tossed yet
    turn_clock: Option<(PlayerId, Countdown)>,
    approach: Option<Vec2>,
    pending: Option<PendingRule>,
    effects: Vec<TurnEffect>,
}

impl TurnController {
    pub fn new(settings: &Settings, seed: u64) -> Self {
        let settings = settings.clone().validated();
        Self {
            rng: Pcg32::seed_from_u64(seed),
            bounds: settings.bounds(),
            uncertainty_radius: settings.uncertainty_radius,
            rule_radius: settings.initial_rule_radius,
            flight_ms: settings.toss_flight_ms,
            turn_limit_ms: settings.turn_time_limit_ms,
            flight: None,
            turn_clock: None,
            approach: None,
            pending: None,
            effects: Vec::new(),
        }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Take the effects produced since the last call
    pub fn drain_effects(&mut self) -> Vec<TurnEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Remaining turn time, if a limit is running
    pub fn turn_time_left(&self, now_ms: f64) -> Option<f64> {
        self.turn_clock.as_ref().map(|(_, c)| c.remaining_ms(now_ms))
    }

    pub fn has_pending_rule(&self) -> bool {
        self.pending.is_some()
    }

    /// Current pending rule shape, and whether it may be submitted
    pub fn pending_shape(&self) -> Option<(Shape, bool)> {
        self.pending.map(|p| (p.shape, !p.intersecting))
    }

    /// Whether this client can start a toss right now
    pub fn can_flip<S: DocumentStore>(&self, replica: &SessionReplica<S>) -> bool {
        replica.is_local_turn() && replica.game().is_some_and(|g| !g.is_player_busy)
    }

    pub fn phase<S: DocumentStore>(&self, replica: &SessionReplica<S>) -> Option<TurnPhase> {
        let game = replica.game()?;
        let player = game.current_player_id.clone();

        if let Some(alert) = &game.alert {
            let outcome = match (alert.kind, &alert.rule_id) {
                (AlertKind::RuleTriggered, Some(id)) => TossOutcome::RuleTriggered(id.clone()),
                _ => TossOutcome::Miss,
            };
            return Some(TurnPhase::Resolved(player, outcome));
        }

        let phase = match (game.is_player_busy, game.has_flipped) {
            (true, false) => TurnPhase::Tossing(player),
            (true, true) if game.indicator_location.is_some() => TurnPhase::IndicatorShown(player),
            (true, true) if game.quarter_location.is_some() => TurnPhase::AwaitingRule(player),
            _ => TurnPhase::Idle(player),
        };
        Some(phase)
    }

    // === Transitions ===

    /// Claim the turn for the current player
    pub fn begin_turn<S: DocumentStore>(&mut self, replica: &mut SessionReplica<S>) -> Result<()> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        if !replica.is_local_turn() {
            return Err(TurnError::NotAuthorized);
        }
        if game.is_player_busy {
            return Err(TurnError::PlayerBusy);
        }
        log::info!("{} starts a toss", replica.player_name(&game.current_player_id));
        replica.mutate(GameUpdate::busy())?;
        Ok(())
    }

    /// Commit the coin's approach point. From here the toss must resolve.
    pub fn record_approach<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
        now_ms: f64,
    ) -> Result<Vec2> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        if !replica.is_local_turn() {
            return Err(TurnError::NotAuthorized);
        }
        if !game.is_player_busy {
            return Err(TurnError::NotTossing);
        }
        if game.has_flipped {
            return Err(TurnError::AlreadyFlipped);
        }
        let player = game.current_player_id.clone();

        let point = geometry::randomize_approach(&self.bounds, &mut self.rng);
        replica.mutate(GameUpdate::indicator(point))?;

        self.approach = Some(point);
        self.flight = Some((player, Countdown::start(now_ms, self.flight_ms)));
        self.turn_clock = None;
        self.effects.push(TurnEffect::ShowIndicator(point));
        self.effects.push(TurnEffect::PlaySound(SoundCue::Flip));
        log::debug!("Approach at ({:.1}, {:.1})", point.x, point.y);
        Ok(point)
    }

    /// Land the coin: jitter the approach point and resolve there
    pub fn resolve<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
    ) -> Result<TossOutcome> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        let Some(approach) = self.approach.or(game.indicator_location) else {
            self.flight = None;
            return Err(TurnError::NotInFlight);
        };
        let landing = geometry::apply_uncertainty(approach, self.uncertainty_radius, &mut self.rng);
        self.resolve_at(replica, landing)
    }

    /// Resolve an in-flight toss at a known landing point
    pub fn resolve_at<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
        landing: Vec2,
    ) -> Result<TossOutcome> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        if !game.has_flipped {
            self.approach = None;
            self.flight = None;
            return Err(TurnError::NotInFlight);
        }
        let player = game.current_player_id.clone();
        let name = replica.player_name(&player).to_string();

        self.approach = None;
        self.flight = None;
        self.effects.push(TurnEffect::HideIndicator);

        if !geometry::is_within_bounds(landing, &self.bounds) {
            let alert = Alert::text(format!("{name} missed the board and drinks four!"));
            replica.mutate(GameUpdate {
                indicator_location: Some(None),
                alert: Some(Some(alert.clone())),
                ..Default::default()
            })?;
            replica.create_message(Message::new(MessageKind::Missed, vec![player]))?;
            self.effects.push(TurnEffect::PlaySound(SoundCue::Miss));
            self.effects.push(TurnEffect::ShowAlert(alert));
            log::info!("{} missed the board", name);
            return Ok(TossOutcome::Miss);
        }

        let shape = Shape::square_around(landing, self.rule_radius);
        let hit = replica
            .rules()
            .rule_at(landing)
            .or_else(|| replica.rules().rule_overlapping(&shape, OVERLAP_MARGIN))
            .cloned();

        if let Some(rule) = hit {
            replica.add_count_for_rule(&rule.id)?;
            let alert =
                Alert::rule_triggered(rule.id.clone(), format!("{name}: {}", rule.display_text));
            replica.mutate(GameUpdate {
                quarter_location: Some(Some(landing)),
                indicator_location: Some(None),
                alert: Some(Some(alert.clone())),
                ..Default::default()
            })?;
            replica.create_message(
                Message::new(MessageKind::RuleTriggered, vec![player]).with_text(&rule.display_text),
            )?;
            self.effects.push(TurnEffect::PlaySound(SoundCue::RuleTriggered));
            self.effects.push(TurnEffect::ShowAlert(alert));
            log::info!("{} landed on rule {}", name, rule.id);
            return Ok(TossOutcome::RuleTriggered(rule.id));
        }

        replica.mutate(GameUpdate {
            quarter_location: Some(Some(landing)),
            indicator_location: Some(None),
            ..Default::default()
        })?;
        self.pending = Some(PendingRule {
            point: landing,
            base: shape,
            shape,
            intersecting: false,
        });
        self.effects.push(TurnEffect::PlaySound(SoundCue::Land));
        self.effects.push(TurnEffect::PromptForRule(shape));
        log::info!("{} landed on free space", name);
        Ok(TossOutcome::NewRuleEligible {
            point: landing,
            shape,
        })
    }

    /// Resize the pending rule relative to its original square. Returns
    /// whether the new shape is clear of every other rule.
    pub fn resize_pending<S: DocumentStore>(
        &mut self,
        replica: &SessionReplica<S>,
        scale_x: f32,
        scale_y: f32,
    ) -> Result<bool> {
        let pending = self.pending.as_mut().ok_or(TurnError::NothingPending)?;
        pending.shape = pending.base.scaled(scale_x, scale_y);
        pending.intersecting = geometry::intersects(&pending.shape, replica.rules().shapes());
        Ok(!pending.intersecting)
    }

    /// Write the pending rule and pass the turn on
    pub fn submit_rule<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
        text: &str,
    ) -> Result<Rule> {
        let pending = self.pending.ok_or(TurnError::NothingPending)?;
        if !replica.is_local_turn() {
            return Err(TurnError::NotAuthorized);
        }
        if text.trim().is_empty() {
            return Err(TurnError::EmptyRuleText);
        }
        if pending.intersecting {
            return Err(TurnError::ShapeIntersects);
        }

        let rule = replica.create_rule(pending.shape, text)?;
        log::debug!(
            "Rule placed at ({:.1}, {:.1})",
            pending.point.x,
            pending.point.y
        );
        self.pending = None;
        self.effects.push(TurnEffect::RenderShape(pending.shape));
        self.effects.push(TurnEffect::PlaySound(SoundCue::RuleCreated));
        self.advance_turn(replica)?;
        Ok(rule)
    }

    /// Current player gives up the turn
    pub fn skip_turn<S: DocumentStore>(&mut self, replica: &mut SessionReplica<S>) -> Result<()> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        if !replica.is_local_turn() {
            return Err(TurnError::NotAuthorized);
        }
        let player = game.current_player_id.clone();
        replica.create_message(Message::new(MessageKind::SkippedTurn, vec![player]))?;
        self.force_advance(replica)
    }

    /// Anyone may force the turn forward to unstick a session
    pub fn panic_skip<S: DocumentStore>(&mut self, replica: &mut SessionReplica<S>) -> Result<()> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        let player = game.current_player_id.clone();
        log::warn!("Panic skip of {}'s turn", replica.player_name(&player));
        replica.create_message(Message::new(MessageKind::PanicSkip, vec![player]))?;
        self.force_advance(replica)
    }

    fn force_advance<S: DocumentStore>(&mut self, replica: &mut SessionReplica<S>) -> Result<()> {
        if replica.game().is_some_and(|g| g.alert.is_some()) {
            replica.mutate(GameUpdate::alert(None))?;
        }
        self.advance_turn(replica)?;
        Ok(())
    }

    /// Hand the turn to the next player in the locally known order
    ///
    /// This is the only place the turn rotates. The order comes from the
    /// local player list, which may lag behind a late join.
    pub fn advance_turn<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
    ) -> Result<PlayerId> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        let players = replica.players();
        if players.is_empty() {
            return Err(TurnError::NoPlayers);
        }
        let next_idx = players
            .iter()
            .position(|p| p.id == game.current_player_id)
            .map_or(0, |i| (i + 1) % players.len());
        let next = players[next_idx].id.clone();

        self.cancel_local_turn();
        replica.mutate(GameUpdate::next_turn(next.clone()))?;
        self.effects.push(TurnEffect::TurnAdvanced(next.clone()));
        self.effects.push(TurnEffect::PlaySound(SoundCue::TurnChange));
        log::info!("Turn passes to {}", replica.player_name(&next));
        Ok(next)
    }

    /// Close the alert and pass the turn on
    pub fn dismiss_alert<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
    ) -> Result<()> {
        let game = replica.game().ok_or(TurnError::NoGame)?;
        if game.alert.is_none() {
            return Err(TurnError::NoAlert);
        }
        if !replica.is_local_turn() {
            return Err(TurnError::NotAuthorized);
        }
        replica.mutate(GameUpdate::alert(None))?;
        self.advance_turn(replica)?;
        Ok(())
    }

    fn cancel_local_turn(&mut self) {
        self.flight = None;
        self.turn_clock = None;
        self.approach = None;
        self.pending = None;
    }

    // === Driver ===

    /// Pump remote deltas and run whatever is due at `now_ms`
    ///
    /// Call once per frame. Starts the approach once a local toss has been
    /// claimed, resolves when the flight timer fires, and skips the turn when
    /// the time limit runs out before the coin is tossed.
    pub fn update<S: DocumentStore>(
        &mut self,
        replica: &mut SessionReplica<S>,
        now_ms: f64,
    ) -> Result<()> {
        replica.pump();
        let Some(game) = replica.game().cloned() else {
            return Ok(());
        };

        // Someone else moved the turn on; our local toss state is stale
        let clock_player = self.turn_clock.as_ref().map(|(p, _)| p);
        let flight_player = self.flight.as_ref().map(|(p, _)| p);
        let moved_on = clock_player
            .into_iter()
            .chain(flight_player)
            .any(|p| p != &game.current_player_id);
        let toss_reset = self.flight.is_some() && !game.has_flipped;
        if moved_on || toss_reset {
            self.cancel_local_turn();
        }
        if self.pending.is_some() && !game.has_flipped {
            self.pending = None;
        }

        if let Some(limit) = self.turn_limit_ms {
            if self.turn_clock.is_none() && !game.has_flipped && self.pending.is_none() {
                self.turn_clock = Some((
                    game.current_player_id.clone(),
                    Countdown::start(now_ms, limit),
                ));
            }
        }

        if game.is_player_busy
            && !game.has_flipped
            && self.flight.is_none()
            && replica.is_local_turn()
        {
            self.record_approach(replica, now_ms)?;
            return Ok(());
        }

        if self.flight.as_ref().is_some_and(|(_, f)| f.is_due(now_ms)) {
            self.resolve(replica)?;
            return Ok(());
        }

        let expired = self
            .turn_clock
            .as_ref()
            .is_some_and(|(_, c)| c.is_due(now_ms));
        if expired && !game.has_flipped && game.alert.is_none() && replica.is_local_turn() {
            self.effects
                .push(TurnEffect::TurnTimeExpired(game.current_player_id.clone()));
            self.skip_turn(replica)?;
        }
        Ok(())
    }
}

/// Alert text as shown in the modal, with rule details when it has any
pub fn describe_alert<S: DocumentStore>(replica: &SessionReplica<S>, alert: &Alert) -> String {
    let rule = alert.rule_id.as_ref().and_then(|id| replica.rules().get(id));
    match (alert.kind, rule) {
        (AlertKind::RuleTriggered, Some(rule)) => format!(
            "{} (created by {}, landed {} times)",
            alert.message,
            replica.player_name(&rule.player_id),
            rule.times_landed
        ),
        _ => alert.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GameType;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn settings() -> Settings {
        Settings::default()
    }

    fn local_game(names: &[&str]) -> (SessionReplica<MemoryStore>, TurnController) {
        let mut replica = SessionReplica::new(MemoryStore::new(), 11);
        replica.create_session(names, None, GameType::Local).unwrap();
        (replica, TurnController::new(&settings(), 22))
    }

    fn current(replica: &SessionReplica<MemoryStore>) -> PlayerId {
        replica.game().unwrap().current_player_id.clone()
    }

    fn toss_in_flight(replica: &mut SessionReplica<MemoryStore>, ctl: &mut TurnController) {
        ctl.begin_turn(replica).unwrap();
        ctl.record_approach(replica, 0.0).unwrap();
    }

    #[test]
    fn test_three_players_rotate_in_order() {
        let (mut replica, mut ctl) = local_game(&["A", "B", "C"]);
        let ids: Vec<PlayerId> = replica.players().iter().map(|p| p.id.clone()).collect();
        assert_eq!(current(&replica), ids[0]);
        assert_eq!(ctl.advance_turn(&mut replica).unwrap(), ids[1]);
        assert_eq!(ctl.advance_turn(&mut replica).unwrap(), ids[2]);
        assert_eq!(ctl.advance_turn(&mut replica).unwrap(), ids[0]);
        assert_eq!(current(&replica), ids[0]);
    }

    #[test]
    fn test_begin_turn_sets_busy_and_blocks_second_begin() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        assert!(ctl.can_flip(&replica));
        ctl.begin_turn(&mut replica).unwrap();
        assert!(replica.game().unwrap().is_player_busy);
        assert!(!ctl.can_flip(&replica));
        assert_eq!(ctl.begin_turn(&mut replica), Err(TurnError::PlayerBusy));
        assert_eq!(
            ctl.phase(&replica),
            Some(TurnPhase::Tossing(current(&replica)))
        );

        ctl.advance_turn(&mut replica).unwrap();
        assert!(!replica.game().unwrap().is_player_busy);
    }

    #[test]
    fn test_record_approach_commits_indicator() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        assert_eq!(
            ctl.record_approach(&mut replica, 0.0),
            Err(TurnError::NotTossing)
        );
        ctl.begin_turn(&mut replica).unwrap();
        let point = ctl.record_approach(&mut replica, 0.0).unwrap();
        let game = replica.game().unwrap();
        assert!(game.has_flipped);
        assert_eq!(game.indicator_location, Some(point));
        assert!(geometry::is_within_bounds(point, ctl.bounds()));
        assert_eq!(
            ctl.record_approach(&mut replica, 1.0),
            Err(TurnError::AlreadyFlipped)
        );
        assert!(matches!(
            ctl.phase(&replica),
            Some(TurnPhase::IndicatorShown(_))
        ));
        let effects = ctl.drain_effects();
        assert!(effects.contains(&TurnEffect::ShowIndicator(point)));
        assert!(effects.contains(&TurnEffect::PlaySound(SoundCue::Flip)));
    }

    #[test]
    fn test_empty_spot_waits_for_rule_text() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        toss_in_flight(&mut replica, &mut ctl);
        let outcome = ctl.resolve_at(&mut replica, Vec2::new(5.0, 5.0)).unwrap();
        assert!(matches!(outcome, TossOutcome::NewRuleEligible { .. }));

        let game = replica.game().unwrap();
        assert!(game.alert.is_none());
        assert_eq!(game.quarter_location, Some(Vec2::new(5.0, 5.0)));
        assert_eq!(game.indicator_location, None);
        assert!(replica.rules().is_empty());
        assert!(ctl.has_pending_rule());
        assert!(matches!(
            ctl.phase(&replica),
            Some(TurnPhase::AwaitingRule(_))
        ));

        // No text: still pending, still the same player
        let author = current(&replica);
        assert_eq!(
            ctl.submit_rule(&mut replica, "  "),
            Err(TurnError::EmptyRuleText)
        );
        assert!(ctl.has_pending_rule());
        assert!(replica.rules().is_empty());

        let rule = ctl.submit_rule(&mut replica, "Speak in rhyme").unwrap();
        assert_eq!(rule.player_id, author);
        assert_eq!(replica.rules().rule_at(Vec2::new(5.0, 5.0)), Some(&rule));
        assert_ne!(current(&replica), author);
        assert!(!ctl.has_pending_rule());
        assert!(!replica.game().unwrap().is_player_busy);
    }

    #[test]
    fn test_miss_posts_text_alert_and_waits_for_dismissal() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        let player = current(&replica);
        toss_in_flight(&mut replica, &mut ctl);
        let outcome = ctl.resolve_at(&mut replica, Vec2::new(600.0, 600.0)).unwrap();
        assert_eq!(outcome, TossOutcome::Miss);

        let alert = replica.game().unwrap().alert.clone().unwrap();
        assert_eq!(alert.kind, AlertKind::Text);
        assert_eq!(alert.message, "A missed the board and drinks four!");
        assert!(replica.rules().is_empty());
        assert_eq!(current(&replica), player);
        assert_eq!(
            ctl.phase(&replica),
            Some(TurnPhase::Resolved(player.clone(), TossOutcome::Miss))
        );

        ctl.dismiss_alert(&mut replica).unwrap();
        let game = replica.game().unwrap();
        assert!(game.alert.is_none());
        assert_ne!(game.current_player_id, player);
        assert_eq!(ctl.dismiss_alert(&mut replica), Err(TurnError::NoAlert));
    }

    #[test]
    fn test_landing_on_rule_triggers_it() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        toss_in_flight(&mut replica, &mut ctl);
        ctl.resolve_at(&mut replica, Vec2::new(200.0, 200.0)).unwrap();
        let rule = ctl.submit_rule(&mut replica, "Cheers").unwrap();
        replica.pump();

        toss_in_flight(&mut replica, &mut ctl);
        let outcome = ctl.resolve_at(&mut replica, Vec2::new(203.0, 198.0)).unwrap();
        assert_eq!(outcome, TossOutcome::RuleTriggered(rule.id.clone()));
        replica.pump();

        assert_eq!(replica.rules().get(&rule.id).unwrap().times_landed, 1);
        let alert = replica.game().unwrap().alert.clone().unwrap();
        assert_eq!(alert.kind, AlertKind::RuleTriggered);
        assert_eq!(alert.rule_id, Some(rule.id.clone()));
        assert_eq!(alert.message, "B: Cheers");
        assert_eq!(
            describe_alert(&replica, &alert),
            "B: Cheers (created by A, landed 1 times)"
        );
        assert_eq!(replica.rules().len(), 1);
    }

    #[test]
    fn test_near_miss_of_rule_escalates_to_trigger() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        toss_in_flight(&mut replica, &mut ctl);
        ctl.resolve_at(&mut replica, Vec2::new(200.0, 200.0)).unwrap();
        let rule = ctl.submit_rule(&mut replica, "Cheers").unwrap();

        // Outside the rule, but a new square here would overlap it
        toss_in_flight(&mut replica, &mut ctl);
        let outcome = ctl.resolve_at(&mut replica, Vec2::new(215.0, 200.0)).unwrap();
        assert_eq!(outcome, TossOutcome::RuleTriggered(rule.id));
    }

    #[test]
    fn test_resized_shape_must_be_clear_to_submit() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        toss_in_flight(&mut replica, &mut ctl);
        ctl.resolve_at(&mut replica, Vec2::new(100.0, 100.0)).unwrap();
        ctl.submit_rule(&mut replica, "First").unwrap();

        toss_in_flight(&mut replica, &mut ctl);
        ctl.resolve_at(&mut replica, Vec2::new(160.0, 100.0)).unwrap();
        assert_eq!(ctl.resize_pending(&replica, 5.0, 1.0), Ok(false));
        assert_eq!(
            ctl.submit_rule(&mut replica, "Second"),
            Err(TurnError::ShapeIntersects)
        );
        assert_eq!(ctl.resize_pending(&replica, 1.5, 1.5), Ok(true));
        let (shape, ok) = ctl.pending_shape().unwrap();
        assert!(ok);
        assert!((shape.width - 30.0).abs() < 1e-4);
        ctl.submit_rule(&mut replica, "Second").unwrap();
        assert_eq!(replica.rules().len(), 2);
    }

    #[test]
    fn test_skip_and_panic_force_advance_from_any_state() {
        let (mut replica, mut ctl) = local_game(&["A", "B", "C"]);
        toss_in_flight(&mut replica, &mut ctl);
        ctl.resolve_at(&mut replica, Vec2::new(50.0, 50.0)).unwrap();
        ctl.skip_turn(&mut replica).unwrap();
        assert!(!ctl.has_pending_rule());
        replica.pump();
        assert_eq!(replica.messages().last().unwrap().display_string, "A skipped their turn.");

        toss_in_flight(&mut replica, &mut ctl);
        ctl.resolve_at(&mut replica, Vec2::new(-5.0, 50.0)).unwrap();
        ctl.panic_skip(&mut replica).unwrap();
        let game = replica.game().unwrap();
        assert!(game.alert.is_none());
        assert!(!game.is_player_busy);
        assert_eq!(game.current_player_id, replica.players()[2].id);
    }

    #[test]
    fn test_remote_authorization() {
        let store = MemoryStore::new();
        let mut host = SessionReplica::new(store.clone(), 1);
        let id = host
            .create_session(&["Ana", "Bo"], Some("Ana"), GameType::Remote)
            .unwrap();
        let bo_id = host.players()[1].id.clone();
        let mut guest = SessionReplica::new(store.clone(), 2);
        guest.join_session(id, Some(bo_id)).unwrap();

        let mut host_ctl = TurnController::new(&settings(), 1);
        let mut guest_ctl = TurnController::new(&settings(), 2);
        assert_eq!(guest_ctl.begin_turn(&mut guest), Err(TurnError::NotAuthorized));
        assert_eq!(guest_ctl.skip_turn(&mut guest), Err(TurnError::NotAuthorized));

        host_ctl.begin_turn(&mut host).unwrap();
        host_ctl.record_approach(&mut host, 0.0).unwrap();
        host_ctl.resolve_at(&mut host, Vec2::new(900.0, 0.0)).unwrap();
        guest.pump();
        assert_eq!(guest_ctl.dismiss_alert(&mut guest), Err(TurnError::NotAuthorized));

        // Panic skip works for anyone
        guest_ctl.panic_skip(&mut guest).unwrap();
        host.pump();
        assert_eq!(host.game().unwrap().current_player_id, host.players()[1].id);
        assert!(guest.is_local_turn());
    }

    #[test]
    fn test_toss_recovers_after_remote_panic_skip() {
        let store = MemoryStore::new();
        let mut host = SessionReplica::new(store.clone(), 1);
        let id = host
            .create_session(&["Ana", "Bo"], Some("Ana"), GameType::Remote)
            .unwrap();
        let bo_id = host.players()[1].id.clone();
        let mut guest = SessionReplica::new(store.clone(), 2);
        guest.join_session(id.clone(), Some(bo_id)).unwrap();
        let mut host_ctl = TurnController::new(&settings(), 1);
        let mut guest_ctl = TurnController::new(&settings(), 2);

        // Ana's coin is in the air when Bo forces the turn on
        host_ctl.begin_turn(&mut host).unwrap();
        host_ctl.update(&mut host, 0.0).unwrap();
        assert!(host.game().unwrap().has_flipped);
        guest.pump();
        guest_ctl.panic_skip(&mut guest).unwrap();

        // Bo tosses before Ana's client catches up; Ana must not land it
        guest_ctl.begin_turn(&mut guest).unwrap();
        guest_ctl.update(&mut guest, 10.0).unwrap();
        assert_eq!(host_ctl.update(&mut host, 3000.0), Ok(()));
        assert!(store.snapshot(&id).unwrap().game.indicator_location.is_some());

        guest_ctl.update(&mut guest, 2510.0).unwrap();
        guest_ctl.skip_turn(&mut guest).unwrap();

        // Back to Ana, who can toss and land again
        assert_eq!(host_ctl.update(&mut host, 6000.0), Ok(()));
        assert!(host.is_local_turn());
        host_ctl.begin_turn(&mut host).unwrap();
        host_ctl.update(&mut host, 6000.0).unwrap();
        assert!(host.game().unwrap().has_flipped);
        assert_eq!(host_ctl.update(&mut host, 8500.0), Ok(()));
        let game = host.game().unwrap();
        assert!(game.indicator_location.is_none());
        assert!(game.alert.is_some() || game.quarter_location.is_some());
    }

    #[test]
    fn test_resolve_without_toss_disarms_flight() {
        let (mut replica, mut ctl) = local_game(&["A", "B"]);
        toss_in_flight(&mut replica, &mut ctl);
        ctl.advance_turn(&mut replica).unwrap();
        ctl.flight = Some((current(&replica), Countdown::start(0.0, 0.0)));
        assert_eq!(ctl.resolve(&mut replica), Err(TurnError::NotInFlight));
        assert!(ctl.flight.is_none());
        assert_eq!(ctl.update(&mut replica, 10.0), Ok(()));
    }

    #[test]
    fn test_invalid_board_size_does_not_panic() {
        let s = Settings {
            canvas_width: -10.0,
            canvas_height: f32::NAN,
            ..Settings::default()
        };
        let mut replica = SessionReplica::new(MemoryStore::new(), 6);
        replica.create_session(&["A", "B"], None, GameType::Local).unwrap();
        let mut ctl = TurnController::new(&s, 6);
        assert_eq!(ctl.bounds().width(), crate::consts::CANVAS_WIDTH);

        ctl.begin_turn(&mut replica).unwrap();
        ctl.update(&mut replica, 0.0).unwrap();
        assert!(replica.game().unwrap().has_flipped);
    }

    #[test]
    fn test_concurrent_begin_turn_double_toss_race() {
        // Two tabs of a local game both believe they may act
        let store = MemoryStore::new();
        let mut a = SessionReplica::new(store.clone(), 1);
        let id = a.create_session(&["Ana", "Bo"], None, GameType::Local).unwrap();
        let mut b = SessionReplica::new(store.clone(), 2);
        b.join_session(id.clone(), None).unwrap();

        let mut ctl_a = TurnController::new(&settings(), 1);
        let mut ctl_b = TurnController::new(&settings(), 2);
        ctl_a.begin_turn(&mut a).unwrap();
        // b has not seen a's write yet
        ctl_b.begin_turn(&mut b).unwrap();
        assert!(store.snapshot(&id).unwrap().game.is_player_busy);
    }

    #[test]
    fn test_stale_player_list_rotates_to_wrong_player() {
        let store = MemoryStore::new();
        let mut a = SessionReplica::new(store.clone(), 1);
        let id = a.create_session(&["Ana", "Bo"], None, GameType::Local).unwrap();
        let mut b = SessionReplica::new(store.clone(), 2);
        b.join_session(id, None).unwrap();

        let mut ctl_b = TurnController::new(&settings(), 2);
        ctl_b.advance_turn(&mut b).unwrap(); // Bo's turn
        a.pump();
        let cy = a.create_player("Cy").unwrap();

        // b never saw Cy join, so it wraps back to Ana
        let next = ctl_b.advance_turn(&mut b).unwrap();
        assert_ne!(next, cy);
        assert_eq!(next, b.players()[0].id);
    }

    #[test]
    fn test_update_drives_full_toss() {
        let mut s = settings();
        s.uncertainty_radius = 0.0;
        let mut replica = SessionReplica::new(MemoryStore::new(), 3);
        replica.create_session(&["A", "B"], None, GameType::Local).unwrap();
        let mut ctl = TurnController::new(&s, 3);

        ctl.begin_turn(&mut replica).unwrap();
        ctl.update(&mut replica, 0.0).unwrap();
        assert!(replica.game().unwrap().has_flipped);

        ctl.update(&mut replica, s.toss_flight_ms - 1.0).unwrap();
        assert!(replica.game().unwrap().indicator_location.is_some());

        ctl.update(&mut replica, s.toss_flight_ms).unwrap();
        let game = replica.game().unwrap();
        assert!(game.indicator_location.is_none());
        // Zero jitter from an on-board approach always lands on the board
        assert!(game.quarter_location.is_some());
        assert!(ctl.has_pending_rule());
    }

    #[test]
    fn test_turn_time_limit_skips_idle_player() {
        let mut s = settings();
        s.turn_time_limit_ms = Some(1000.0);
        let mut replica = SessionReplica::new(MemoryStore::new(), 4);
        replica.create_session(&["A", "B"], None, GameType::Local).unwrap();
        let first = current(&replica);
        let mut ctl = TurnController::new(&s, 4);

        ctl.update(&mut replica, 0.0).unwrap();
        assert_eq!(ctl.turn_time_left(400.0), Some(600.0));
        ctl.update(&mut replica, 999.0).unwrap();
        assert_eq!(current(&replica), first);
        ctl.update(&mut replica, 1000.0).unwrap();
        assert_ne!(current(&replica), first);
        assert!(
            ctl.drain_effects()
                .contains(&TurnEffect::TurnTimeExpired(first))
        );
    }

    #[test]
    fn test_time_limit_does_not_cancel_inflight_toss() {
        let mut s = settings();
        s.turn_time_limit_ms = Some(100.0);
        let mut replica = SessionReplica::new(MemoryStore::new(), 5);
        replica.create_session(&["A", "B"], None, GameType::Local).unwrap();
        let first = current(&replica);
        let mut ctl = TurnController::new(&s, 5);

        ctl.update(&mut replica, 0.0).unwrap();
        ctl.begin_turn(&mut replica).unwrap();
        ctl.update(&mut replica, 50.0).unwrap();
        ctl.update(&mut replica, 500.0).unwrap();
        assert_eq!(current(&replica), first);
        assert!(replica.game().unwrap().has_flipped);
    }

    #[test]
    fn test_effects_serialize_for_the_page() {
        let json = serde_json::to_value([
            TurnEffect::PlaySound(SoundCue::RuleTriggered),
            TurnEffect::HideIndicator,
        ])
        .unwrap();
        assert_eq!(json[0]["type"], "playSound");
        assert_eq!(json[0]["value"], "ruleTriggered");
        assert_eq!(json[1]["type"], "hideIndicator");
    }

    #[test]
    fn test_countdown() {
        let c = Countdown::start(100.0, 50.0);
        assert!(!c.is_due(149.0));
        assert!(c.is_due(150.0));
        assert_eq!(c.remaining_ms(120.0), 30.0);
        assert_eq!(c.remaining_ms(500.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_rotation_has_period_n(n in 2usize..=10, extra in 0usize..10) {
            let names: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
            let mut replica = SessionReplica::new(MemoryStore::new(), n as u64);
            replica.create_session(&names, None, GameType::Local).unwrap();
            let mut ctl = TurnController::new(&Settings::default(), 0);

            for _ in 0..extra {
                ctl.advance_turn(&mut replica).unwrap();
            }
            let start = replica.game().unwrap().current_player_id.clone();
            let mut seen = std::collections::HashSet::new();
            for _ in 0..n {
                let next = ctl.advance_turn(&mut replica).unwrap();
                prop_assert!(!replica.game().unwrap().is_player_busy);
                seen.insert(next);
            }
            prop_assert_eq!(seen.len(), n);
            prop_assert_eq!(&replica.game().unwrap().current_player_id, &start);
        }
    }
}
