use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Fixed key the bearer token is persisted under.
pub const TOKEN_STORAGE_KEY: &str = "access_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    Tasks,
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only records the route in the log.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: Route) {
        info!(?route, "navigation requested");
    }
}

/// Navigator that remembers every route it was sent to.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes.lock().last().copied()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().push(route);
    }
}

pub trait TokenStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<String>>;
    fn save(&self, token: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(TOKEN_STORAGE_KEY);
        debug!(path = %path.display(), "opened token store");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    fn save(&self, token: &str) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        write!(temp, "{token}")?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed removing {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, token: &str) -> anyhow::Result<()> {
        *self.slot.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Reads the user out of a bearer token's claims.
///
/// The signature is not checked here; the backend verifies it on every request.
pub fn decode_user(token: &str) -> Option<UserContext> {
    let header = decode_header(token).ok()?;
    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) if !data.claims.sub.trim().is_empty() => Some(UserContext {
            id: data.claims.sub,
            email: data.claims.email,
        }),
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "bearer token claims could not be decoded");
            None
        }
    }
}

/// The signed-in session: one token slot plus the store that persists it.
#[derive(Clone)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
    store: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("has_token", &self.token.read().is_some())
            .finish()
    }
}

impl Session {
    #[tracing::instrument(skip(store))]
    pub fn restore(store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let token = store.load().context("failed to load stored token")?;
        debug!(has_token = token.is_some(), "restored session");
        Ok(Self {
            token: Arc::new(RwLock::new(token)),
            store,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            token: Arc::new(RwLock::new(None)),
            store: Arc::new(MemoryTokenStore::default()),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn user(&self) -> Option<UserContext> {
        self.token().as_deref().and_then(decode_user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    #[tracing::instrument(skip_all)]
    pub fn set_token(&self, token: String) -> anyhow::Result<()> {
        self.store.save(&token).context("failed to persist token")?;
        *self.token.write() = Some(token);
        info!("session token stored");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) {
        *self.token.write() = None;
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear persisted token");
        }
        info!("session token cleared");
    }
}
