//! Browser-only checks for the interval-driven exercises. Run with `wasm-pack test --headless`.
#![cfg(target_arch = "wasm32")]

use grounding_frontend_rs::{
    BreathingPhase,
    exercises::{BreathingExercise, MeditationExercise},
};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn ignore() -> js_sys::Function {
    js_sys::Function::new_no_args("")
}

#[wasm_bindgen_test]
fn breathing_starts_paused_on_a_full_inhale() {
    let mut exercise = BreathingExercise::new("4-7-8".into(), ignore());
    assert!(!exercise.state().active());

    exercise.start().unwrap();
    assert!(exercise.state().active());
    assert_eq!(exercise.phase(), BreathingPhase::Inhale);
    assert_eq!(exercise.remaining(), 4);

    exercise.pause();
    assert!(!exercise.state().active());
    assert_eq!(exercise.remaining(), 4);
}

#[wasm_bindgen_test]
fn meditation_shows_time_left() {
    let mut exercise = MeditationExercise::new(90, ignore());
    assert_eq!(exercise.remaining_display(), "01:30");

    exercise.start().unwrap();
    assert!(exercise.state().active());
    exercise.reset();
    assert!(!exercise.state().active());
    assert_eq!(exercise.remaining_display(), "01:30");
}
