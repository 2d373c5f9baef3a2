//! Browser bindings
//!
//! The page owns the DOM (board, rule prompt, alert modal, message drawer)
//! and calls into `WebGame` for every player action. `tick` is called once
//! per animation frame and returns the presentation effects as JSON.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::audio::AudioManager;
use crate::model::GameType;
use crate::platform;
use crate::replica::SessionReplica;
use crate::settings::Settings;
use crate::store::MemoryStore;
use crate::turn::{TurnController, TurnEffect, describe_alert};

struct Inner {
    replica: SessionReplica<MemoryStore>,
    turns: TurnController,
    audio: AudioManager,
    settings: Settings,
}

#[wasm_bindgen]
pub struct WebGame {
    inner: Rc<RefCell<Inner>>,
}

#[wasm_bindgen]
impl WebGame {
    /// Start a hot-seat game for `names`
    #[wasm_bindgen(constructor)]
    pub fn new(names: Vec<String>) -> Result<WebGame, JsError> {
        let settings = Settings::load();
        let seed = platform::entropy_seed();

        let mut replica = SessionReplica::new(MemoryStore::new(), seed);
        if let Some(id) = platform::location_query().and_then(|q| platform::join_param(&q)) {
            log::warn!("Join link for {} ignored, no hosted store configured", id);
        }
        replica.create_session(&names, None, GameType::Local)?;

        let inner = Rc::new(RefCell::new(Inner {
            turns: TurnController::new(&settings, seed.rotate_left(17)),
            audio: AudioManager::new(&settings),
            replica,
            settings,
        }));

        {
            let inner = inner.clone();
            platform::on_page_unload(move || {
                if let Ok(mut g) = inner.try_borrow_mut() {
                    g.replica.teardown();
                }
            });
        }

        Ok(WebGame { inner })
    }

    /// Claim the turn and toss
    pub fn flip(&self) -> Result<(), JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner {
            replica, turns, audio, ..
        } = &mut *g;
        audio.resume();
        turns.begin_turn(replica)?;
        Ok(())
    }

    /// Advance timers; returns the effects produced as a JSON array
    pub fn tick(&self, now_ms: f64) -> Result<String, JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner {
            replica, turns, audio, ..
        } = &mut *g;
        turns.update(replica, now_ms)?;

        let effects = turns.drain_effects();
        for effect in &effects {
            if let TurnEffect::PlaySound(cue) = effect {
                audio.play(*cue);
            }
        }
        Ok(serde_json::to_string(&effects)?)
    }

    /// Resize the pending rule; false while it overlaps another rule
    pub fn resize_rule(&self, scale_x: f32, scale_y: f32) -> Result<bool, JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner { replica, turns, .. } = &mut *g;
        Ok(turns.resize_pending(replica, scale_x, scale_y)?)
    }

    pub fn submit_rule(&self, text: &str) -> Result<(), JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner { replica, turns, .. } = &mut *g;
        turns.submit_rule(replica, text)?;
        Ok(())
    }

    pub fn dismiss_alert(&self) -> Result<(), JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner { replica, turns, .. } = &mut *g;
        turns.dismiss_alert(replica)?;
        Ok(())
    }

    pub fn skip_turn(&self) -> Result<(), JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner { replica, turns, .. } = &mut *g;
        turns.skip_turn(replica)?;
        Ok(())
    }

    pub fn panic_skip(&self) -> Result<(), JsError> {
        let mut g = self.inner.borrow_mut();
        let Inner { replica, turns, .. } = &mut *g;
        turns.panic_skip(replica)?;
        Ok(())
    }

    pub fn add_player(&self, name: &str) -> Result<(), JsError> {
        self.inner.borrow_mut().replica.create_player(name)?;
        Ok(())
    }

    /// Alert modal text, with rule details when the alert has any
    pub fn alert_text(&self) -> Option<String> {
        let g = self.inner.borrow();
        let alert = g.replica.game()?.alert.as_ref()?;
        Some(describe_alert(&g.replica, alert))
    }

    /// Game, players and rules as JSON
    pub fn state_json(&self) -> Result<String, JsError> {
        let g = self.inner.borrow();
        let state = serde_json::json!({
            "game": g.replica.game(),
            "players": g.replica.players(),
            "currentPlayer": g.replica.current_player(),
            "rules": g.replica.rules().iter().collect::<Vec<_>>(),
            "canFlip": g.turns.can_flip(&g.replica),
        });
        Ok(serde_json::to_string(&state)?)
    }

    /// Message drawer contents, newest first
    pub fn messages_json(&self) -> Result<String, JsError> {
        let g = self.inner.borrow();
        let lines: Vec<&str> = g
            .replica
            .messages()
            .recent_first()
            .map(|m| m.display_string.as_str())
            .collect();
        Ok(serde_json::to_string(&lines)?)
    }

    pub fn set_muted(&self, muted: bool) {
        let mut g = self.inner.borrow_mut();
        g.settings.muted = muted;
        g.settings.save();
        let Inner {
            audio, settings, ..
        } = &mut *g;
        audio.apply_settings(settings);
    }
}
