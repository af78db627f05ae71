use docsync::firebase::FirebaseConfig;

/// Collection holding one document per user, keyed by user id.
pub const USERS_COLLECTION: &str = "users";

/// Firebase project baked in at build time, if the build environment provided one.
pub fn firebase_config() -> Option<FirebaseConfig> {
    Some(FirebaseConfig {
        api_key: option_env!("GROUNDING_FIREBASE_API_KEY")?.to_string(),
        project_id: option_env!("GROUNDING_FIREBASE_PROJECT_ID")?.to_string(),
    })
}
