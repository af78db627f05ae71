mod config;
pub mod breathing;
pub mod exercises;
pub mod meditation;
pub mod model;
pub mod mood;
pub mod reflections;
mod saved_login;
pub mod tasks;
mod ticker;
pub mod transfer;
mod utils;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use docsync::firebase::{
    FirebaseConfig, FirebaseIdentityProvider, FirebaseTokens, FirestoreStore,
};
use docsync::{Auth, Identity, SyncSession};
use slotmap::{Key as _, KeyData};
use wasm_bindgen::prelude::*;

pub use breathing::{BreathingPhase, BreathingPreset, breathing_presets};
pub use model::{
    AppData, AppDataPatch, EmotionalState, LocationType, MoodEntry, RoutineTask, Task,
};
pub use mood::MoodChartPoint;
pub use utils::format_time;

use crate::ticker::Ticker;

/// How often the remote document is re-read to pick up writes from other tabs and devices.
const POLL_MILLIS: i32 = 5000;

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
#[allow(clippy::declare_interior_mutable_const)]
const LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn get_breathing_presets() -> Vec<BreathingPreset> {
    breathing_presets()
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn get_emotional_states() -> Vec<EmotionalState> {
    EmotionalState::ALL.to_vec()
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn emotional_state_color(state: EmotionalState) -> String {
    state.color_class().to_string()
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn location_display(location: LocationType) -> String {
    location.display().to_string()
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn export_file_name() -> String {
    transfer::EXPORT_FILE_NAME.to_string()
}

/// Everything the UI needs: who is signed in, their synced data, and the operations on it.
#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub struct Grounding {
    // nothing here holds a RefCell borrow across an .await, which is what keeps the async methods from panicking on re-entry
    auth: Auth<FirebaseIdentityProvider>,
    store: Rc<FirestoreStore>,
    session: SyncSession<AppData, Rc<FirestoreStore>>,
    poller: RefCell<Option<Ticker>>,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl Grounding {
    /// Uses `config` if given, otherwise the project configured at build time.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(constructor))]
    pub fn new(config: Option<FirebaseConfig>) -> Result<Self, JsValue> {
        // used to only initialize the logger once
        #[allow(clippy::borrow_interior_mutable_const)]
        *LOGGER;

        let firebase = config
            .or_else(config::firebase_config)
            .ok_or_else(|| JsValue::from_str("No Firebase project configured"))?;

        let tokens = Rc::new(FirebaseTokens::new(firebase));
        tokens.on_change(|credentials| {
            saved_login::store(credentials.map(|credentials| credentials.refresh_token.as_str()));
        });

        let store = Rc::new(FirestoreStore::new(
            Rc::clone(&tokens),
            config::USERS_COLLECTION,
        ));
        Ok(Self {
            auth: Auth::new(FirebaseIdentityProvider::new(tokens)),
            session: SyncSession::new(Rc::clone(&store)),
            store,
            poller: RefCell::new(None),
        })
    }

    /// Signs back in with the sign-in saved by a previous page load, if there is one. Otherwise
    /// (or if it has expired) the session ends up signed out and no longer loading.
    pub async fn restore(&self) {
        let resumed = match saved_login::load() {
            Some(token) => self.auth.resume(&token).await.ok(),
            None => None,
        };
        match resumed {
            Some(identity) => self.signed_in(identity).await,
            None => {
                saved_login::store(None);
                self.session.set_identity(None).await;
            }
        }
    }

    pub fn data(&self) -> AppData {
        self.session.data()
    }

    pub fn loading(&self) -> bool {
        self.session.loading()
    }

    pub fn user_email(&self) -> Option<String> {
        self.session.identity().and_then(|identity| identity.email)
    }

    /// The last sign-in, sign-up or sign-out failure.
    pub fn error(&self) -> Option<String> {
        self.auth.error()
    }

    pub fn clear_error(&self) {
        self.auth.clear_error()
    }

    /// `callback` runs after every change to the data or loading state.
    pub fn subscribe(&self, callback: js_sys::Function) -> u64 {
        self.session
            .register_listener(move || {
                let _ = callback.call0(&JsValue::null());
            })
            .data()
            .as_ffi()
    }

    pub fn unsubscribe(&self, key: u64) {
        self.session
            .unregister_listener(KeyData::from_ffi(key).into())
    }

    pub async fn login(&self, email: String, password: String) -> Result<(), JsValue> {
        let identity = self
            .auth
            .login(&email, &password)
            .await
            .map_err(|e| JsValue::from_str(&e.message))?;
        self.signed_in(identity).await;
        Ok(())
    }

    pub async fn signup(&self, email: String, password: String) -> Result<(), JsValue> {
        let identity = self
            .auth
            .signup(&email, &password)
            .await
            .map_err(|e| JsValue::from_str(&e.message))?;
        self.signed_in(identity).await;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), JsValue> {
        self.auth
            .logout()
            .await
            .map_err(|e| JsValue::from_str(&e.message))?;
        self.poller.replace(None);
        self.session.set_identity(None).await;
        Ok(())
    }

    pub async fn save(&self, patch: AppDataPatch) {
        self.session.save(patch).await
    }

    pub async fn refresh(&self) {
        self.session.refresh().await
    }

    pub async fn add_task(&self, text: String) {
        let added = self
            .session
            .with_data(|data| tasks::add_task(&data.tasks, &text, Utc::now()));
        if let Some(tasks) = added {
            self.session.save(AppDataPatch::tasks(tasks)).await;
        }
    }

    pub async fn toggle_task(&self, id: String) {
        let tasks = self
            .session
            .with_data(|data| tasks::toggle_task(&data.tasks, &id));
        self.session.save(AppDataPatch::tasks(tasks)).await;
    }

    pub async fn delete_task(&self, id: String) {
        let tasks = self
            .session
            .with_data(|data| tasks::delete_task(&data.tasks, &id));
        self.session.save(AppDataPatch::tasks(tasks)).await;
    }

    /// Drops `dragged` onto `target`'s position.
    pub async fn reorder_task(&self, dragged: String, target: String) {
        let reordered = self
            .session
            .with_data(|data| tasks::reorder_task(&data.tasks, &dragged, &target));
        if let Some(tasks) = reordered {
            self.session.save(AppDataPatch::tasks(tasks)).await;
        }
    }

    pub fn completion_percentage(&self) -> u32 {
        self.session
            .with_data(|data| tasks::completion_percentage(&data.tasks))
    }

    pub async fn toggle_routine_task(&self, id: String) {
        let routine = self
            .session
            .with_data(|data| tasks::toggle_routine_task(&data.routine_tasks, &id));
        self.session.save(AppDataPatch::routine_tasks(routine)).await;
    }

    pub async fn log_mood(&self, state: EmotionalState, intensity: u8) {
        let history = self.session.with_data(|data| {
            mood::log_mood(&data.mood_history, state, intensity, Utc::now())
        });
        self.session.save(AppDataPatch::mood_history(history)).await;
    }

    /// Entries logged on `date` (`YYYY-MM-DD`, UTC).
    pub fn mood_history_on(&self, date: String) -> Result<Vec<MoodEntry>, JsValue> {
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| JsValue::from_str(&format!("Invalid date {date}: {e}")))?;
        Ok(self
            .session
            .with_data(|data| mood::mood_history_on(&data.mood_history, date)))
    }

    pub fn mood_chart_points(&self) -> Vec<MoodChartPoint> {
        self.session.with_data(|data| {
            mood::mood_chart_points(&data.mood_history, utils::local_offset())
        })
    }

    pub fn recommendations(&self) -> Vec<String> {
        self.session.with_data(|data| {
            mood::recommendations(&data.mood_history, &data.tasks)
                .into_iter()
                .map(str::to_string)
                .collect()
        })
    }

    pub async fn add_reflection(&self, text: String) {
        let added = self.session.with_data(|data| {
            reflections::add_reflection(&data.reflections, &text, utils::local_today())
        });
        if let Some(reflections) = added {
            self.session
                .save(AppDataPatch::reflections(reflections))
                .await;
        }
    }

    pub fn export_json(&self) -> Result<String, JsValue> {
        self.session
            .with_data(transfer::export_json)
            .map_err(|e| JsValue::from_str(&format!("Failed to export data: {e}")))
    }

    /// Replaces the four collections with the contents of an exported file.
    pub async fn import_json(&self, json: String) -> Result<(), JsValue> {
        let patch = transfer::import_json(&json).map_err(|e| {
            log::error!("Error importing data: {e}");
            JsValue::from_str(&e.to_string())
        })?;
        self.session.save(patch).await;
        self.ensure_routine().await;
        Ok(())
    }

    /// Saves the default routine if the current one is empty.
    pub async fn ensure_routine(&self) {
        if self.session.loading() || self.session.identity().is_none() {
            return;
        }
        let seeded = self
            .session
            .with_data(|data| tasks::seeded_routine(&data.routine_tasks));
        if let Some(routine) = seeded {
            log::info!("Routine is empty, restoring the default steps");
            self.session.save(AppDataPatch::routine_tasks(routine)).await;
        }
    }
}

impl Grounding {
    async fn signed_in(&self, identity: Identity) {
        let key = identity.uid.clone();
        self.poller.replace(None);
        self.session.set_identity(Some(identity)).await;

        // the REST store delivers snapshots when polled, so this one ends loading
        if let Err(e) = self.store.poll(&key).await {
            log::error!("Error loading data: {e}");
        }
        self.ensure_routine().await;

        let store = Rc::clone(&self.store);
        let poller = Ticker::every(POLL_MILLIS, move || {
            let store = Rc::clone(&store);
            let key = key.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = store.poll(&key).await {
                    log::warn!("Error polling for remote changes: {e}");
                }
            });
            true
        });
        match poller {
            Ok(poller) => {
                self.poller.replace(Some(poller));
            }
            Err(e) => log::error!("Could not start polling for remote changes: {e:?}"),
        }
    }
}
