//! Who the session belongs to.

use std::{cell::RefCell, collections::HashMap};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    /// Bearer token for the document store, when the provider issues one.
    #[serde(skip)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Credential sign-in. Implementations only report failures through [`AuthError::message`];
/// nothing downstream inspects error kinds.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider {
    fn current(&self) -> Option<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Signs back in with a token from [`IdentityProvider::resume_token`], e.g. after a reload.
    async fn resume(&self, token: &str) -> Result<Identity, AuthError>;

    /// A token that can restore the current sign-in later, if anyone is signed in.
    fn resume_token(&self) -> Option<String>;
}

/// Wraps an [`IdentityProvider`] and remembers the last failure so the UI can show it.
///
/// Every attempt clears the previous message first. Failures are stored *and* returned.
pub struct Auth<P> {
    provider: P,
    error: RefCell<Option<String>>,
}

impl<P: IdentityProvider> Auth<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            error: RefCell::new(None),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn current(&self) -> Option<Identity> {
        self.provider.current()
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.error.replace(None);
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.clear_error();
        let result = self.provider.sign_in(email, password).await;
        self.record(result, "Failed to sign in")
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.clear_error();
        let result = self.provider.sign_up(email, password).await;
        self.record(result, "Failed to create an account")
    }

    /// Restores an earlier sign-in. Failures are returned but not shown as an error, since the
    /// user did not ask for anything.
    pub async fn resume(&self, token: &str) -> Result<Identity, AuthError> {
        self.provider.resume(token).await.inspect_err(|e| {
            log::info!("Could not restore the previous sign-in: {e}");
        })
    }

    pub fn resume_token(&self) -> Option<String> {
        self.provider.resume_token()
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.clear_error();
        let result = self.provider.sign_out().await;
        self.record(result, "Failed to sign out")
    }

    fn record<T>(&self, result: Result<T, AuthError>, fallback: &str) -> Result<T, AuthError> {
        result.map_err(|e| {
            let e = if e.message.is_empty() {
                AuthError::new(fallback)
            } else {
                e
            };
            log::warn!("Authentication failed: {e}");
            self.error.replace(Some(e.message.clone()));
            e
        })
    }
}

struct Account {
    password: String,
    uid: String,
}

/// Accounts kept in memory. Used by tests and for running the app without a backend.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: RefCell<HashMap<String, Account>>,
    current: RefCell<Option<Identity>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = {
            let accounts = self.accounts.borrow();
            match accounts.get(email) {
                Some(account) if account.password == password => Identity {
                    uid: account.uid.clone(),
                    email: Some(email.to_string()),
                    id_token: None,
                },
                _ => return Err(AuthError::new("Invalid email or password")),
            }
        };
        self.current.replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        if !email.contains('@') {
            return Err(AuthError::new("The email address is badly formatted"));
        }
        if password.chars().count() < 6 {
            return Err(AuthError::new("Password should be at least 6 characters"));
        }

        let identity = {
            let mut accounts = self.accounts.borrow_mut();
            if accounts.contains_key(email) {
                return Err(AuthError::new("The email address is already in use"));
            }
            let uid = format!("user-{}", accounts.len() + 1);
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    uid: uid.clone(),
                },
            );
            Identity {
                uid,
                email: Some(email.to_string()),
                id_token: None,
            }
        };
        self.current.replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.replace(None);
        Ok(())
    }

    /// Tokens are `resume:<uid>`.
    async fn resume(&self, token: &str) -> Result<Identity, AuthError> {
        let uid = token
            .strip_prefix("resume:")
            .ok_or_else(|| AuthError::new("Your session has expired, please sign in again"))?;
        let identity = {
            let accounts = self.accounts.borrow();
            let (email, _) = accounts
                .iter()
                .find(|(_, account)| account.uid == uid)
                .ok_or_else(|| AuthError::new("Your session has expired, please sign in again"))?;
            Identity {
                uid: uid.to_string(),
                email: Some(email.clone()),
                id_token: None,
            }
        };
        self.current.replace(Some(identity.clone()));
        Ok(identity)
    }

    fn resume_token(&self) -> Option<String> {
        self.current
            .borrow()
            .as_ref()
            .map(|identity| format!("resume:{}", identity.uid))
    }
}
