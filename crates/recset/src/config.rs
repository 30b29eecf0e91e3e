//! Store and backend configuration.
//!
//! [`StoreConfig`] is built in code, one per record type. [`BackendConfig`]
//! describes where the backend lives and is usually read from the
//! environment.

use std::sync::Arc;

use recset_backend::{Backend, MemoryBackend, SqliteBackend};
use recset_core::{KeySpace, Lookups, Options, Record};
use serde::Deserialize;

use crate::error::{Result, StoreError};

/// Documents fetched per multi-get request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Id count above which a load logs a read-amplification warning.
pub const DEFAULT_WARN_THRESHOLD: usize = 1000;

/// Scan cap applied when a scan query has no count.
pub const DEFAULT_SCAN_COUNT: u64 = 1000;

/// Environment variable holding the backend URL.
pub const BACKEND_URL_VAR: &str = "RECSET_BACKEND_URL";

/// Environment variable holding the backend credential.
pub const BACKEND_TOKEN_VAR: &str = "RECSET_BACKEND_TOKEN";

/// Configuration for one record store.
#[derive(Debug, Clone)]
pub struct StoreConfig<R> {
    /// Key naming for this namespace.
    pub keys: KeySpace,
    /// Secondary lookups.
    pub lookups: Lookups<R>,
    /// Store-level option defaults.
    pub defaults: Options,
    /// Documents per multi-get request.
    pub batch_size: usize,
    /// Id count that triggers a read-amplification warning.
    pub warn_threshold: usize,
    /// Scan cap when a scan query carries no count.
    pub scan_default_count: u64,
}

impl<R: Record> StoreConfig<R> {
    /// Configuration for namespace `key` with the default index name.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            keys: KeySpace::new(key),
            lookups: Lookups::new(),
            defaults: Options::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            scan_default_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Use an explicit primary index name.
    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.keys = KeySpace::with_index_name(self.keys.key().to_string(), index_name);
        self
    }

    pub fn lookups(mut self, lookups: Lookups<R>) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn defaults(mut self, defaults: Options) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn warn_threshold(mut self, warn_threshold: usize) -> Self {
        self.warn_threshold = warn_threshold;
        self
    }

    pub fn scan_default_count(mut self, count: u64) -> Self {
        self.scan_default_count = count;
        self
    }
}

/// Where the backend lives.
///
/// Supported URLs:
///
/// - `memory:` - a fresh [`MemoryBackend`]
/// - `sqlite::memory:` - an in-memory SQLite database
/// - `sqlite:<path>` - a SQLite database file
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Read `RECSET_BACKEND_URL` and `RECSET_BACKEND_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(BACKEND_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| StoreError::Config(format!("{BACKEND_URL_VAR} is not set")))?;
        let token = lookup(BACKEND_TOKEN_VAR).filter(|v| !v.is_empty());
        Ok(Self { url, token })
    }

    /// Open the backend named by the URL.
    pub fn connect(&self) -> Result<Arc<dyn Backend>> {
        let url = self.url.trim();

        if url == "memory:" || url == "memory://" {
            return Ok(Arc::new(MemoryBackend::new()));
        }

        if let Some(rest) = url.strip_prefix("sqlite:") {
            if self.token.is_some() {
                tracing::debug!("sqlite backend ignores the configured token");
            }
            let path = rest.strip_prefix("//").unwrap_or(rest);
            let backend = match path {
                "" => {
                    return Err(StoreError::Config(
                        "sqlite URL is missing a path".to_string(),
                    ))
                }
                ":memory:" => SqliteBackend::open_memory()?,
                path => SqliteBackend::open(path)?,
            };
            return Ok(Arc::new(backend));
        }

        Err(StoreError::Config(format!(
            "unsupported backend URL: {url}"
        )))
    }
}
