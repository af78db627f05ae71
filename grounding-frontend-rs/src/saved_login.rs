//! Keeps the token that restores a sign-in across page reloads in `localStorage`.

use web_sys::Storage;

const KEY: &str = "grounding.refreshToken";

fn storage() -> Option<Storage> {
    web_sys::window()?.local_storage().ok().flatten()
}

pub fn load() -> Option<String> {
    storage()?.get_item(KEY).ok().flatten()
}

/// Stores `token`, or forgets the saved one when `None`.
pub fn store(token: Option<&str>) {
    let Some(storage) = storage() else {
        log::warn!("localStorage unavailable, sign-in will not survive a reload");
        return;
    };
    let result = match token {
        Some(token) => storage.set_item(KEY, token),
        None => storage.remove_item(KEY),
    };
    if let Err(e) = result {
        log::warn!("Could not update the saved sign-in: {e:?}");
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use wasm_bindgen_test::*;

    use super::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn saved_sign_in_survives_until_forgotten() {
        store(Some("refresh-1"));
        assert_eq!(load().as_deref(), Some("refresh-1"));

        store(None);
        assert_eq!(load(), None);
    }
}
