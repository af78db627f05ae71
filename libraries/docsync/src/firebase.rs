//! Utilities for syncing against Firebase: a Firestore REST [`DocumentStore`] and an Identity
//! Toolkit REST [`IdentityProvider`].
//!
//! The REST API has no push channel, so subscriptions are fed by [`FirestoreStore::poll`]. The
//! store polls after each of its own writes; callers poll on an interval to pick up writes from
//! other sessions.
//!
//! ID tokens last an hour. [`FirebaseTokens`] is shared by the provider and the store; it renews
//! the token through the Secure Token API shortly before it expires, and the store retries a
//! request once after renewing when Firestore answers 401.
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::json;
use slotmap::SlotMap;

use crate::{
    ListenerKey,
    identity::{AuthError, Identity, IdentityProvider},
    store::{DocumentStore, Snapshot, StoreError, Subscription},
    value::{BackendTimestamp, Fields, Value},
};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
}

/// Renew this long before the ID token's stated expiry.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// What a sign-in (or a token renewal) hands back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    fn new(uid: String, id_token: String, refresh_token: String, expires_in: &str) -> Self {
        let seconds = expires_in.parse().unwrap_or_else(|_| {
            log::warn!("Unexpected token lifetime {expires_in:?}, assuming an hour");
            3600
        });
        Self {
            uid,
            id_token,
            refresh_token,
            expires_at: Utc::now() + TimeDelta::seconds(seconds),
        }
    }

    pub fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(EXPIRY_MARGIN_SECONDS) >= self.expires_at
    }
}

type CredentialsCallback = Box<dyn Fn(Option<&Credentials>)>;

/// The signed-in user's tokens.
pub struct FirebaseTokens {
    config: FirebaseConfig,
    credentials: RefCell<Option<Credentials>>,
    on_change: RefCell<Option<CredentialsCallback>>,
}

impl FirebaseTokens {
    pub fn new(config: FirebaseConfig) -> Self {
        Self {
            config,
            credentials: RefCell::new(None),
            on_change: RefCell::new(None),
        }
    }

    pub fn config(&self) -> &FirebaseConfig {
        &self.config
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.borrow().clone()
    }

    /// Runs after every sign-in, renewal and sign-out; used to persist the refresh token.
    pub fn on_change(&self, callback: impl Fn(Option<&Credentials>) + 'static) {
        self.on_change.replace(Some(Box::new(callback)));
    }

    pub fn set(&self, credentials: Option<Credentials>) {
        self.credentials.replace(credentials.clone());
        if let Some(callback) = self.on_change.borrow().as_ref() {
            callback(credentials.as_ref());
        }
    }

    /// A usable ID token, renewed first if it is about to expire. `None` when signed out.
    pub async fn id_token(&self) -> Result<Option<String>, AuthError> {
        let Some(credentials) = self.credentials() else {
            return Ok(None);
        };
        if !credentials.expires_soon(Utc::now()) {
            return Ok(Some(credentials.id_token));
        }
        log::info!("ID token expires soon, renewing it");
        Ok(Some(self.renew(&credentials.refresh_token).await?.id_token))
    }

    /// Trades `refresh_token` for a new ID token and makes the result current.
    pub async fn renew(&self, refresh_token: &str) -> Result<Credentials, AuthError> {
        let url = format!(
            "https://securetoken.googleapis.com/v1/token?key={}",
            self.config.api_key
        );
        let payload = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });

        let client = fetch_happen::Client;
        let response = client
            .post(&url)
            .json(&payload)
            .map_err(|e| AuthError::new(format!("{e:?}")))?
            .send()
            .await
            .map_err(|e| AuthError::new(format!("{e:?}")))?;
        let ok = response.ok();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::new(format!("{e:?}")))?;

        if !ok {
            let code = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_default();
            return Err(AuthError::new(describe_auth_error(&code)));
        }

        let renewed: RenewResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::new(format!("Failed to parse token response: {e}")))?;
        let credentials = renewed.into_credentials();
        self.set(Some(credentials.clone()));
        Ok(credentials)
    }
}

type SnapshotCallback = Rc<dyn Fn(Option<&Snapshot>)>;

struct Listener {
    key: String,
    callback: SnapshotCallback,
    // None: nothing delivered yet. Some(None): delivered "document absent".
    delivered: Option<Option<String>>,
}

type Listeners = RefCell<SlotMap<ListenerKey, Listener>>;

pub struct FirestoreStore {
    tokens: Rc<FirebaseTokens>,
    collection: String,
    listeners: Rc<Listeners>,
}

impl FirestoreStore {
    /// Requests carry the current ID token from `tokens`, if anyone is signed in.
    pub fn new(tokens: Rc<FirebaseTokens>, collection: impl Into<String>) -> Self {
        Self {
            tokens,
            collection: collection.into(),
            listeners: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    fn database_path(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.tokens.config().project_id
        )
    }

    fn document_name(&self, key: &str) -> String {
        format!("{}/{}/{key}", self.database_path(), self.collection)
    }

    async fn bearer(&self) -> Result<Option<String>, StoreError> {
        let token = self
            .tokens
            .id_token()
            .await
            .map_err(|e| StoreError::Request(format!("could not renew ID token: {e}")))?;
        Ok(token.map(|token| format!("Bearer {token}")))
    }

    /// After a 401, renews the ID token so the request can be sent once more.
    async fn renew_after_rejection<T>(&self, result: &Result<T, StoreError>) -> bool {
        if !is_unauthorized(result) {
            return false;
        }
        let Some(credentials) = self.tokens.credentials() else {
            return false;
        };
        log::info!("Firestore rejected the ID token, renewing it");
        match self.tokens.renew(&credentials.refresh_token).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Failed to renew ID token: {e}");
                false
            }
        }
    }

    /// Re-reads `key` and delivers it to every subscriber that has not seen this version yet.
    pub async fn poll(&self, key: &str) -> Result<(), StoreError> {
        let fetched = self.fetch(key).await?;
        let version = fetched.as_ref().map(|(_, update_time)| update_time.clone());
        let snapshot = fetched.map(|(snapshot, _)| snapshot);

        let due: Vec<SnapshotCallback> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners
                .values_mut()
                .filter(|listener| listener.key == key)
                .filter(|listener| listener.delivered.as_ref() != Some(&version))
                .map(|listener| {
                    listener.delivered = Some(version.clone());
                    Rc::clone(&listener.callback)
                })
                .collect()
        };
        for callback in due {
            callback(snapshot.as_ref());
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<(Snapshot, String)>, StoreError> {
        let result = self.fetch_once(key).await;
        if self.renew_after_rejection(&result).await {
            return self.fetch_once(key).await;
        }
        result
    }

    async fn fetch_once(&self, key: &str) -> Result<Option<(Snapshot, String)>, StoreError> {
        let url = format!(
            "https://firestore.googleapis.com/v1/{}",
            self.document_name(key)
        );

        let client = fetch_happen::Client;
        let mut request = client.get(&url);
        if let Some(bearer) = self.bearer().await? {
            request = request.header("Authorization", bearer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("{e:?}")))?;

        let status = response.status().to_string();
        if status.starts_with("404") {
            return Ok(None);
        }
        let ok = response.ok();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Request(format!("{e:?}")))?;
        if !ok {
            return Err(StoreError::Status { status, body });
        }

        let document: RestDocument = serde_json::from_str(&body).map_err(|e| {
            StoreError::Malformed(format!("Failed to parse document: {e}\nResponse body: {body}"))
        })?;
        let fields = document
            .fields
            .into_iter()
            .map(|(name, value)| Ok((name, decode(&value)?)))
            .collect::<Result<Fields, StoreError>>()?;

        Ok(Some((
            Snapshot {
                key: key.to_string(),
                fields,
            },
            document.update_time,
        )))
    }

    async fn commit(&self, key: &str, fields: Fields, create: bool) -> Result<(), StoreError> {
        let mut encoded = serde_json::Map::new();
        let mut transforms = Vec::new();
        for (name, value) in fields {
            if value == Value::ServerTimestamp {
                transforms.push(json!({"fieldPath": name, "setToServerValue": "REQUEST_TIME"}));
            } else {
                encoded.insert(name, encode(&value));
            }
        }

        let field_paths: Vec<String> = encoded.keys().cloned().collect();
        let mut write = json!({
            "update": {
                "name": self.document_name(key),
                "fields": encoded,
            },
            "updateTransforms": transforms,
        });
        if create {
            write["currentDocument"] = json!({"exists": false});
        } else {
            write["updateMask"] = json!({ "fieldPaths": field_paths });
        }
        let payload = json!({ "writes": [write] });

        let mut result = self.send_commit(&payload).await;
        if self.renew_after_rejection(&result).await {
            result = self.send_commit(&payload).await;
        }
        match result {
            Err(StoreError::Status { status, body })
                if create && (status.starts_with("409") || body.contains("ALREADY_EXISTS")) =>
            {
                log::info!("Document {key} already exists, leaving it untouched");
                return Ok(());
            }
            result => result?,
        }

        if let Err(e) = self.poll(key).await {
            log::warn!("Failed to refresh subscribers after write: {e}");
        }
        Ok(())
    }
}

impl FirestoreStore {
    async fn send_commit(&self, payload: &serde_json::Value) -> Result<(), StoreError> {
        let url = format!(
            "https://firestore.googleapis.com/v1/{}:commit",
            self.database_path()
        );
        let client = fetch_happen::Client;
        let mut request = client.post(&url);
        if let Some(bearer) = self.bearer().await? {
            request = request.header("Authorization", bearer);
        }
        let response = request
            .json(payload)
            .map_err(|e| StoreError::Request(format!("{e:?}")))?
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("{e:?}")))?;

        if !response.ok() {
            let status = response.status().to_string();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Status { status, body });
        }
        Ok(())
    }
}

fn is_unauthorized<T>(result: &Result<T, StoreError>) -> bool {
    matches!(result, Err(StoreError::Status { status, .. }) if status.starts_with("401"))
}

impl DocumentStore for FirestoreStore {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.fetch(key).await?.map(|(snapshot, _)| snapshot))
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        self.commit(key, fields, true).await
    }

    async fn merge_write(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        self.commit(key, fields, false).await
    }

    /// The first event arrives with the next [`FirestoreStore::poll`] for `key`.
    fn subscribe(
        &self,
        key: &str,
        on_change: impl Fn(Option<&Snapshot>) + 'static,
    ) -> Subscription {
        let listener_key = self.listeners.borrow_mut().insert(Listener {
            key: key.to_string(),
            callback: Rc::new(on_change),
            delivered: None,
        });
        log::info!("Subscribed to {key}");

        let listeners: Weak<Listeners> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.borrow_mut().remove(listener_key);
            }
        })
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestDocument {
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
    update_time: String,
}

fn timestamp_json(datetime: DateTime<Utc>) -> serde_json::Value {
    json!({ "timestampValue": datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
}

fn encode(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Integer(i) => json!({ "integerValue": i.to_string() }),
        Value::Double(d) => json!({ "doubleValue": d }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() } })
        }
        Value::Map(fields) => {
            let fields: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(name, value)| (name.clone(), encode(value)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
        Value::Timestamp(timestamp) => match timestamp.to_datetime() {
            Some(datetime) => timestamp_json(datetime),
            None => json!({ "nullValue": null }),
        },
        Value::DateTime(datetime) => timestamp_json(*datetime),
        Value::ServerTimestamp => {
            // transforms only reach top-level fields
            log::warn!("Nested server timestamp written with the client clock");
            timestamp_json(Utc::now())
        }
    }
}

fn decode(value: &serde_json::Value) -> Result<Value, StoreError> {
    let malformed = || StoreError::Malformed(format!("unrecognized Firestore value: {value}"));
    let object = value.as_object().ok_or_else(malformed)?;
    let (kind, inner) = object.iter().next().ok_or_else(malformed)?;

    Ok(match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().ok_or_else(malformed)?),
        "integerValue" => Value::Integer(
            inner
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| inner.as_i64())
                .ok_or_else(malformed)?,
        ),
        "doubleValue" => Value::Double(inner.as_f64().ok_or_else(malformed)?),
        "stringValue" | "referenceValue" => {
            Value::String(inner.as_str().ok_or_else(malformed)?.to_string())
        }
        "timestampValue" => {
            let datetime = inner
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .ok_or_else(malformed)?;
            Value::Timestamp(BackendTimestamp::from_datetime(datetime.with_timezone(&Utc)))
        }
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(|values| values.as_array())
                .map(|values| values.iter().map(decode).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Map(
            inner
                .get("fields")
                .and_then(|fields| fields.as_object())
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(name, value)| Ok((name.clone(), decode(value)?)))
                        .collect::<Result<Fields, StoreError>>()
                })
                .transpose()?
                .unwrap_or_default(),
        ),
        _ => return Err(malformed()),
    })
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// The Secure Token API answers in snake case.
#[derive(serde::Deserialize)]
struct RenewResponse {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

impl RenewResponse {
    fn into_credentials(self) -> Credentials {
        Credentials::new(
            self.user_id,
            self.id_token,
            self.refresh_token,
            &self.expires_in,
        )
    }
}

#[derive(serde::Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(serde::Deserialize)]
struct LookupUser {
    #[serde(default)]
    email: Option<String>,
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

/// Email/password accounts through the Identity Toolkit REST API.
pub struct FirebaseIdentityProvider {
    tokens: Rc<FirebaseTokens>,
    current: RefCell<Option<Identity>>,
}

impl FirebaseIdentityProvider {
    /// Signing in stores the new credentials in `tokens`; signing out clears them.
    pub fn new(tokens: Rc<FirebaseTokens>) -> Self {
        Self {
            tokens,
            current: RefCell::new(None),
        }
    }

    async fn lookup_email(&self, id_token: &str) -> Result<Option<String>, AuthError> {
        let url = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:lookup?key={}",
            self.tokens.config().api_key
        );
        let client = fetch_happen::Client;
        let response = client
            .post(&url)
            .json(&json!({ "idToken": id_token }))
            .map_err(|e| AuthError::new(format!("{e:?}")))?
            .send()
            .await
            .map_err(|e| AuthError::new(format!("{e:?}")))?;
        if !response.ok() {
            return Err(AuthError::new(format!(
                "Account lookup failed with status {}",
                response.status()
            )));
        }
        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::new(format!("Failed to parse account lookup: {e:?}")))?;
        Ok(lookup.users.into_iter().next().and_then(|user| user.email))
    }

    async fn account_request(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let url = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:{endpoint}?key={}",
            self.tokens.config().api_key
        );
        let payload = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let client = fetch_happen::Client;
        let response = client
            .post(&url)
            .json(&payload)
            .map_err(|e| AuthError::new(format!("{e:?}")))?
            .send()
            .await
            .map_err(|e| AuthError::new(format!("{e:?}")))?;
        let ok = response.ok();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::new(format!("{e:?}")))?;

        if !ok {
            let code = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_default();
            return Err(AuthError::new(describe_auth_error(&code)));
        }

        let account: AccountResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::new(format!("Failed to parse sign-in response: {e}")))?;
        let identity = Identity {
            uid: account.local_id.clone(),
            email: account.email.or_else(|| Some(email.to_string())),
            id_token: Some(account.id_token.clone()),
        };
        self.tokens.set(Some(Credentials::new(
            account.local_id,
            account.id_token,
            account.refresh_token,
            &account.expires_in,
        )));
        self.current.replace(Some(identity.clone()));
        Ok(identity)
    }
}

fn describe_auth_error(code: &str) -> String {
    // codes look like "WEAK_PASSWORD : Password should be at least 6 characters"
    let (code, detail) = code.split_once(" : ").unwrap_or((code, ""));
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "Invalid email or password".to_string()
        }
        "EMAIL_EXISTS" => "The email address is already in use".to_string(),
        "INVALID_EMAIL" => "The email address is badly formatted".to_string(),
        "USER_DISABLED" => "This account has been disabled".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, try again later".to_string(),
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => {
            "Your session has expired, please sign in again".to_string()
        }
        _ if !detail.is_empty() => detail.to_string(),
        _ => code.to_string(),
    }
}

impl IdentityProvider for FirebaseIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.account_request("signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.account_request("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.replace(None);
        self.tokens.set(None);
        Ok(())
    }

    async fn resume(&self, token: &str) -> Result<Identity, AuthError> {
        let credentials = self.tokens.renew(token).await?;
        let email = match self.lookup_email(&credentials.id_token).await {
            Ok(email) => email,
            Err(e) => {
                log::warn!("Signed back in without an email address: {e}");
                None
            }
        };
        let identity = Identity {
            uid: credentials.uid,
            email,
            id_token: Some(credentials.id_token),
        };
        self.current.replace(Some(identity.clone()));
        Ok(identity)
    }

    fn resume_token(&self) -> Option<String> {
        self.tokens
            .credentials()
            .map(|credentials| credentials.refresh_token)
    }
}
