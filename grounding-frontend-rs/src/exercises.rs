//! Breathing and meditation timers driven by a one-second browser interval.
//!
//! The interval only exists while a timer is running: pausing, resetting or dropping the
//! exercise clears it.

use std::{cell::RefCell, rc::Rc};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;

use crate::{
    breathing::{BreathingPhase, BreathingTimer, breathing_preset},
    meditation::MeditationTimer,
    ticker::Ticker,
    utils::format_time,
};

const TICK_MILLIS: i32 = 1000;

fn notify(on_change: &js_sys::Function) {
    let _ = on_change.call0(&JsValue::null());
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub struct BreathingExercise {
    timer: Rc<RefCell<BreathingTimer>>,
    on_change: Rc<js_sys::Function>,
    ticker: Option<Ticker>,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl BreathingExercise {
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(constructor))]
    pub fn new(preset_id: String, on_change: js_sys::Function) -> Self {
        Self {
            timer: Rc::new(RefCell::new(BreathingTimer::new(breathing_preset(&preset_id)))),
            on_change: Rc::new(on_change),
            ticker: None,
        }
    }

    pub fn state(&self) -> BreathingTimer {
        self.timer.borrow().clone()
    }

    pub fn phase(&self) -> BreathingPhase {
        self.timer.borrow().phase()
    }

    pub fn remaining(&self) -> u32 {
        self.timer.borrow().remaining()
    }

    pub fn progress(&self) -> f64 {
        self.timer.borrow().progress()
    }

    pub fn start(&mut self) -> Result<(), JsValue> {
        self.timer.borrow_mut().start();
        let timer = Rc::clone(&self.timer);
        let on_change = Rc::clone(&self.on_change);
        self.ticker = Some(Ticker::every(TICK_MILLIS, move || {
            let active = {
                let mut timer = timer.borrow_mut();
                timer.tick();
                timer.active()
            };
            notify(&on_change);
            active
        })?);
        notify(&self.on_change);
        Ok(())
    }

    pub fn pause(&mut self) {
        self.ticker = None;
        self.timer.borrow_mut().pause();
        notify(&self.on_change);
    }

    pub fn reset(&mut self) {
        self.ticker = None;
        self.timer.borrow_mut().reset();
        notify(&self.on_change);
    }

    pub fn set_preset(&mut self, preset_id: String) {
        self.ticker = None;
        self.timer
            .borrow_mut()
            .set_preset(breathing_preset(&preset_id));
        notify(&self.on_change);
    }
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub struct MeditationExercise {
    timer: Rc<RefCell<MeditationTimer>>,
    on_change: Rc<js_sys::Function>,
    ticker: Option<Ticker>,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl MeditationExercise {
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(constructor))]
    pub fn new(target_seconds: u32, on_change: js_sys::Function) -> Self {
        Self {
            timer: Rc::new(RefCell::new(MeditationTimer::new(target_seconds))),
            on_change: Rc::new(on_change),
            ticker: None,
        }
    }

    pub fn state(&self) -> MeditationTimer {
        self.timer.borrow().clone()
    }

    /// Time left, as `mm:ss`.
    pub fn remaining_display(&self) -> String {
        format_time(self.timer.borrow().remaining())
    }

    pub fn progress(&self) -> f64 {
        self.timer.borrow().progress()
    }

    pub fn set_target(&mut self, target_seconds: u32) {
        self.timer.borrow_mut().set_target(target_seconds);
        notify(&self.on_change);
    }

    pub fn start(&mut self) -> Result<(), JsValue> {
        self.timer.borrow_mut().start();
        self.run()
    }

    pub fn resume(&mut self) -> Result<(), JsValue> {
        self.timer.borrow_mut().resume();
        if !self.timer.borrow().active() {
            return Ok(());
        }
        self.run()
    }

    pub fn pause(&mut self) {
        self.ticker = None;
        self.timer.borrow_mut().pause();
        notify(&self.on_change);
    }

    pub fn reset(&mut self) {
        self.ticker = None;
        self.timer.borrow_mut().reset();
        notify(&self.on_change);
    }

    fn run(&mut self) -> Result<(), JsValue> {
        let timer = Rc::clone(&self.timer);
        let on_change = Rc::clone(&self.on_change);
        // stops itself once the target is reached
        self.ticker = Some(Ticker::every(TICK_MILLIS, move || {
            let active = {
                let mut timer = timer.borrow_mut();
                timer.tick();
                timer.active()
            };
            notify(&on_change);
            active
        })?);
        notify(&self.on_change);
        Ok(())
    }
}
