use std::{cell::Cell, rc::Rc};

use wasm_bindgen::{JsCast as _, JsValue, closure::Closure};

/// A browser `setInterval`. The interval is cleared when this is dropped, or as soon as the
/// callback returns `false`.
pub struct Ticker {
    handle: Rc<Cell<Option<i32>>>,
    _callback: Closure<dyn FnMut()>,
}

impl Ticker {
    pub fn every(millis: i32, mut on_tick: impl FnMut() -> bool + 'static) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;

        let handle: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));
        let callback = Closure::<dyn FnMut()>::new({
            let handle = Rc::clone(&handle);
            move || {
                if !on_tick() {
                    clear(&handle);
                }
            }
        });
        let id = window.set_interval_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            millis,
        )?;
        handle.set(Some(id));

        Ok(Self {
            handle,
            _callback: callback,
        })
    }

    pub fn running(&self) -> bool {
        self.handle.get().is_some()
    }
}

fn clear(handle: &Cell<Option<i32>>) {
    if let Some(id) = handle.take()
        && let Some(window) = web_sys::window()
    {
        window.clear_interval_with_handle(id);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        clear(&self.handle);
    }
}
