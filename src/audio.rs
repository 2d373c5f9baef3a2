//! Turn cues through the Web Audio API
//!
//! Every cue is a short oscillator envelope, so there are no sound files to
//! ship.

use web_sys::{AudioContext, GainNode, OscillatorNode, OscillatorType};

use crate::settings::Settings;
use crate::turn::SoundCue;

pub struct AudioManager {
    ctx: Option<AudioContext>,
    volume: f32,
}

impl AudioManager {
    pub fn new(settings: &Settings) -> Self {
        // Fails outside a secure context
        let ctx = AudioContext::new().ok();
        if ctx.is_none() {
            log::warn!("Failed to create AudioContext - audio disabled");
        }
        Self {
            ctx,
            volume: settings.effective_volume(),
        }
    }

    /// Pick up volume or mute changes
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.volume = settings.effective_volume();
    }

    /// Resume audio context (required after user gesture)
    pub fn resume(&self) {
        if let Some(ctx) = &self.ctx {
            let _ = ctx.resume();
        }
    }

    pub fn play(&self, cue: SoundCue) {
        let vol = self.volume;
        if vol <= 0.0 {
            return;
        }
        let Some(ctx) = &self.ctx else { return };

        if ctx.state() == web_sys::AudioContextState::Suspended {
            let _ = ctx.resume();
        }

        match cue {
            SoundCue::Flip => self.play_flip(ctx, vol),
            SoundCue::Land => self.play_land(ctx, vol),
            SoundCue::Miss => self.play_miss(ctx, vol),
            SoundCue::RuleTriggered => self.play_rule_triggered(ctx, vol),
            SoundCue::RuleCreated => self.play_rule_created(ctx, vol),
            SoundCue::TurnChange => self.play_turn_change(ctx, vol),
        }
    }

    // === Cue generators ===

    fn create_osc(
        &self,
        ctx: &AudioContext,
        freq: f32,
        osc_type: OscillatorType,
    ) -> Option<(OscillatorNode, GainNode)> {
        let osc = ctx.create_oscillator().ok()?;
        let gain = ctx.create_gain().ok()?;

        osc.set_type(osc_type);
        osc.frequency().set_value(freq);
        osc.connect_with_audio_node(&gain).ok()?;
        gain.connect_with_audio_node(&ctx.destination()).ok()?;

        Some((osc, gain))
    }

    /// One enveloped note starting `delay` seconds from now
    fn note(
        &self,
        ctx: &AudioContext,
        freq: f32,
        osc_type: OscillatorType,
        peak: f32,
        delay: f64,
        len: f64,
    ) {
        let Some((osc, gain)) = self.create_osc(ctx, freq, osc_type) else {
            return;
        };
        let t = ctx.current_time() + delay;

        gain.gain().set_value_at_time(0.01, t).ok();
        gain.gain().linear_ramp_to_value_at_time(peak, t + 0.01).ok();
        gain.gain()
            .exponential_ramp_to_value_at_time(0.01, t + len)
            .ok();

        osc.start_with_when(t).ok();
        osc.stop_with_when(t + len + 0.02).ok();
    }

    /// Rising metallic ping as the coin leaves the hand
    fn play_flip(&self, ctx: &AudioContext, vol: f32) {
        let Some((osc, gain)) = self.create_osc(ctx, 600.0, OscillatorType::Triangle) else {
            return;
        };
        let t = ctx.current_time();

        gain.gain().set_value_at_time(vol * 0.3, t).ok();
        gain.gain()
            .exponential_ramp_to_value_at_time(0.01, t + 0.25)
            .ok();
        osc.frequency().set_value_at_time(600.0, t).ok();
        osc.frequency()
            .exponential_ramp_to_value_at_time(1800.0, t + 0.2)
            .ok();

        osc.start().ok();
        osc.stop_with_when(t + 0.3).ok();
    }

    /// Coin clinks down on free space
    fn play_land(&self, ctx: &AudioContext, vol: f32) {
        self.note(ctx, 1200.0, OscillatorType::Sine, vol * 0.4, 0.0, 0.08);
        self.note(ctx, 1500.0, OscillatorType::Sine, vol * 0.25, 0.07, 0.12);
    }

    /// Falling buzz when the coin leaves the board
    fn play_miss(&self, ctx: &AudioContext, vol: f32) {
        let Some((osc, gain)) = self.create_osc(ctx, 220.0, OscillatorType::Sawtooth) else {
            return;
        };
        let t = ctx.current_time();

        gain.gain().set_value_at_time(vol * 0.3, t).ok();
        gain.gain()
            .exponential_ramp_to_value_at_time(0.01, t + 0.5)
            .ok();
        osc.frequency().set_value_at_time(220.0, t).ok();
        osc.frequency()
            .exponential_ramp_to_value_at_time(55.0, t + 0.45)
            .ok();

        osc.start().ok();
        osc.stop_with_when(t + 0.55).ok();
    }

    /// Three-note fanfare
    fn play_rule_triggered(&self, ctx: &AudioContext, vol: f32) {
        for (i, freq) in [523.25, 659.25, 783.99].into_iter().enumerate() {
            self.note(ctx, freq, OscillatorType::Square, vol * 0.2, i as f64 * 0.09, 0.15);
        }
    }

    /// Soft two-note chime
    fn play_rule_created(&self, ctx: &AudioContext, vol: f32) {
        self.note(ctx, 880.0, OscillatorType::Sine, vol * 0.3, 0.0, 0.2);
        self.note(ctx, 1318.5, OscillatorType::Sine, vol * 0.25, 0.12, 0.3);
    }

    fn play_turn_change(&self, ctx: &AudioContext, vol: f32) {
        self.note(ctx, 440.0, OscillatorType::Triangle, vol * 0.2, 0.0, 0.1);
    }
}
