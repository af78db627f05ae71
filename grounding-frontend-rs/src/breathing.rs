//! Guided breathing: inhale, hold, exhale, repeat, one second per tick.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub enum BreathingPhase {
    Inhale,
    Hold,
    Exhale,
}

impl BreathingPhase {
    pub fn next(self) -> Self {
        match self {
            BreathingPhase::Inhale => BreathingPhase::Hold,
            BreathingPhase::Hold => BreathingPhase::Exhale,
            BreathingPhase::Exhale => BreathingPhase::Inhale,
        }
    }
}

/// Seconds spent in each phase.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct BreathingPreset {
    pub id: String,
    pub name: String,
    pub inhale: u32,
    pub hold: u32,
    pub exhale: u32,
    pub description: String,
}

impl BreathingPreset {
    fn builtin(id: &str, name: &str, (inhale, hold, exhale): (u32, u32, u32), description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            inhale,
            hold,
            exhale,
            description: description.to_string(),
        }
    }

    pub fn duration(&self, phase: BreathingPhase) -> u32 {
        match phase {
            BreathingPhase::Inhale => self.inhale,
            BreathingPhase::Hold => self.hold,
            BreathingPhase::Exhale => self.exhale,
        }
    }
}

pub fn breathing_presets() -> Vec<BreathingPreset> {
    vec![
        BreathingPreset::builtin("4-4-4", "Box Breathing", (4, 4, 4), "Equal breathing for balance"),
        BreathingPreset::builtin("4-7-8", "Relaxing Breath", (4, 7, 8), "Promotes relaxation"),
        BreathingPreset::builtin("6-2-6", "Energizing Breath", (6, 2, 6), "Boosts energy"),
    ]
}

/// Looks up a built-in preset. Unknown ids get the first one.
pub fn breathing_preset(id: &str) -> BreathingPreset {
    let mut presets = breathing_presets();
    let index = presets
        .iter()
        .position(|preset| preset.id == id)
        .unwrap_or(0);
    presets.swap_remove(index)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi)]
pub struct BreathingTimer {
    preset: BreathingPreset,
    phase: BreathingPhase,
    remaining: u32,
    active: bool,
}

impl Default for BreathingTimer {
    fn default() -> Self {
        Self::new(breathing_preset(""))
    }
}

impl BreathingTimer {
    pub fn new(preset: BreathingPreset) -> Self {
        Self {
            remaining: preset.inhale,
            preset,
            phase: BreathingPhase::Inhale,
            active: false,
        }
    }

    pub fn preset(&self) -> &BreathingPreset {
        &self.preset
    }

    pub fn phase(&self) -> BreathingPhase {
        self.phase
    }

    /// Seconds left in the current phase.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Starts over from a full inhale.
    pub fn start(&mut self) {
        self.rewind();
        self.active = true;
    }

    pub fn pause(&mut self) {
        self.active = false;
    }

    pub fn reset(&mut self) {
        self.pause();
        self.rewind();
    }

    pub fn set_preset(&mut self, preset: BreathingPreset) {
        self.preset = preset;
        self.reset();
    }

    /// Advances one second. Does nothing while paused.
    pub fn tick(&mut self) {
        if !self.active {
            return;
        }
        if self.remaining <= 1 {
            self.phase = self.phase.next();
            self.remaining = self.preset.duration(self.phase);
        } else {
            self.remaining -= 1;
        }
    }

    /// How far through the current phase we are, from 0 to 1.
    pub fn progress(&self) -> f64 {
        let duration = self.preset.duration(self.phase);
        if duration == 0 {
            return 1.0;
        }
        1.0 - f64::from(self.remaining.min(duration)) / f64::from(duration)
    }

    fn rewind(&mut self) {
        self.phase = BreathingPhase::Inhale;
        self.remaining = self.preset.inhale;
    }
}
