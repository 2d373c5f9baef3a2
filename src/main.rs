//! Flip Rules entry point
//!
//! The web build starts logging and hands control to the page, which drives
//! `flip_rules::web::WebGame`. The native build plays a headless hot-seat
//! game and prints the narration.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        web_sys::console::warn_1(&"Logger already initialized".into());
    }
    log::info!("Flip Rules starting...");
}

#[cfg(not(target_arch = "wasm32"))]
mod hot_seat {
    use flip_rules::platform;
    use flip_rules::turn::describe_alert;
    use flip_rules::{
        GameType, MemoryStore, SessionReplica, Settings, TurnController, TurnError, TurnPhase,
    };

    const DEFAULT_PLAYERS: [&str; 3] = ["Ana", "Bo", "Cy"];
    const ROUNDS: usize = 4;
    /// Simulated frame length
    const FRAME_MS: f64 = 100.0;
    /// Frames to wait for a toss before giving up on it
    const MAX_FRAMES: usize = 200;

    const RULE_IDEAS: [&str; 6] = [
        "Speak only in questions",
        "No saying anyone's name",
        "Thumbs on the table",
        "Everyone toasts the rule maker",
        "Talk like a pirate",
        "Left hand only",
    ];

    pub fn run(names: Vec<String>) -> Result<(), TurnError> {
        let names = if names.len() < 2 {
            DEFAULT_PLAYERS.iter().map(|s| s.to_string()).collect()
        } else {
            names
        };
        let settings = Settings::load();
        let seed = platform::entropy_seed();
        log::info!("Hot-seat game with seed {}", seed);

        let mut replica = SessionReplica::new(MemoryStore::new(), seed);
        replica.create_session(&names, None, GameType::Local)?;
        let mut turns = TurnController::new(&settings, seed.rotate_left(17));

        let mut now = 0.0;
        let mut ideas = RULE_IDEAS.iter().cycle();
        for _ in 0..ROUNDS * names.len() {
            turns.begin_turn(&mut replica)?;

            let mut frames = 0;
            loop {
                turns.update(&mut replica, now)?;
                now += FRAME_MS;
                frames += 1;

                match turns.phase(&replica) {
                    Some(TurnPhase::AwaitingRule(_)) => {
                        let text = ideas.next().copied().unwrap_or("Drink");
                        turns.submit_rule(&mut replica, text)?;
                        break;
                    }
                    Some(TurnPhase::Resolved(..)) => {
                        if let Some(alert) = replica.game().and_then(|g| g.alert.clone()) {
                            println!("  ! {}", describe_alert(&replica, &alert));
                        }
                        turns.dismiss_alert(&mut replica)?;
                        break;
                    }
                    _ if frames >= MAX_FRAMES => {
                        log::warn!("Toss never resolved, forcing the turn on");
                        turns.panic_skip(&mut replica)?;
                        break;
                    }
                    _ => {}
                }
            }
            turns.drain_effects();
            replica.pump();
        }

        println!();
        for entry in replica.messages().iter() {
            println!("{}", entry.display_string);
        }
        println!();
        for rule in replica.rules().iter() {
            println!(
                "[{}] {} (by {}, landed {} times)",
                rule.id,
                rule.display_text,
                replica.player_name(&rule.player_id),
                rule.times_landed
            );
        }
        replica.teardown();
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Flip Rules (native) starting...");

    let names: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = hot_seat::run(names) {
        log::error!("Game stopped: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
