//! Stored HPC credentials
//!
//! Credentials live in a JSON file keyed by identifier: the cluster URL, or
//! `defaultconfig` for the defaults. The file is readable by its owner only.

use crate::config::{DEFAULT_EXPIRATION_MINUTES, DEFAULT_IDENTIFIER};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to access credential store '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Credential store '{}' is corrupted: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("To store non-default credentials, a URL, a user and a password are needed")]
    MissingFields,
    #[error("There are no credentials stored for '{0}'")]
    NotStored(String),
    #[error("The stored '{0}' credentials are expired")]
    Expired(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_expiration")]
    pub expiration_minutes: i64,
}

fn default_expiration() -> i64 {
    DEFAULT_EXPIRATION_MINUTES
}

impl StoredCredentials {
    pub fn is_expired(&self) -> bool {
        credentials_expired(self.timestamp, self.expiration_minutes, Utc::now())
    }
}

/// Complete set of values needed to request a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub url: String,
    pub user: String,
    pub password: String,
}

/// Whether credentials stored at `timestamp` are older than `expiration_minutes`.
///
/// An expiration too large to represent never expires.
pub fn credentials_expired(
    timestamp: DateTime<Utc>,
    expiration_minutes: i64,
    now: DateTime<Utc>,
) -> bool {
    TimeDelta::try_minutes(expiration_minutes).map_or(false, |limit| now - timestamp > limit)
}

#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredCredentials>,
}

impl CredentialStore {
    /// Load the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(CredentialError::Io { path, source }),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store credentials and return the identifier they were stored under.
    ///
    /// With `default`, any subset of values can be stored as the defaults;
    /// values not given keep their previous default.
    pub fn store(
        &mut self,
        user: Option<&str>,
        password: Option<&str>,
        url: Option<&str>,
        default: bool,
        expiration_minutes: Option<i64>,
    ) -> Result<String, CredentialError> {
        let identifier = match (default, url, user, password) {
            (true, ..) => DEFAULT_IDENTIFIER.to_string(),
            (false, Some(url), Some(_), Some(_)) => url.to_string(),
            (false, ..) => return Err(CredentialError::MissingFields),
        };

        let previous = self.entries.remove(&identifier);
        let keep = |given: Option<&str>, old: Option<String>| given.map(str::to_string).or(old);
        let (old_url, old_user, old_password) = previous
            .map(|entry| (entry.url, entry.user, entry.password))
            .unwrap_or_default();

        let entry = StoredCredentials {
            url: keep(url, old_url),
            user: keep(user, old_user),
            password: keep(password, old_password),
            timestamp: Utc::now(),
            expiration_minutes: expiration_minutes.unwrap_or(DEFAULT_EXPIRATION_MINUTES),
        };
        self.entries.insert(identifier.clone(), entry);
        self.save()?;

        debug!(identifier = %identifier, "stored credentials");
        Ok(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&StoredCredentials> {
        self.entries.get(identifier)
    }

    pub fn default_url(&self) -> Option<&str> {
        self.get(DEFAULT_IDENTIFIER)
            .and_then(|entry| entry.url.as_deref())
    }

    /// Remove the credentials under `identifier`; `false` if there were none.
    pub fn delete(&mut self, identifier: &str) -> Result<bool, CredentialError> {
        if self.entries.remove(identifier).is_none() {
            return Ok(false);
        }
        self.save()?;
        debug!(identifier, "deleted credentials");
        Ok(true)
    }

    /// Fill in missing values from the store.
    ///
    /// The stored entry is the one for `url`, or the defaults without a URL.
    /// Expired entries are deleted and reported as an error.
    pub fn access(
        &mut self,
        url: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<ResolvedCredentials, CredentialError> {
        if let (Some(url), Some(user), Some(password)) = (url, user, password) {
            return Ok(ResolvedCredentials {
                url: url.to_string(),
                user: user.to_string(),
                password: password.to_string(),
            });
        }

        let identifier = url.unwrap_or(DEFAULT_IDENTIFIER).to_string();
        let stored = match self.get(&identifier) {
            Some(entry) if entry.url.is_some() && entry.user.is_some() && entry.password.is_some() => {
                entry.clone()
            }
            _ => return Err(CredentialError::NotStored(identifier)),
        };

        if stored.is_expired() {
            self.delete(&identifier)?;
            return Err(CredentialError::Expired(identifier));
        }

        let pick = |given: Option<&str>, stored: Option<String>| {
            given.map(str::to_string).or(stored).unwrap_or_default()
        };
        Ok(ResolvedCredentials {
            url: pick(url, stored.url),
            user: pick(user, stored.user),
            password: pick(password, stored.password),
        })
    }

    fn save(&self) -> Result<(), CredentialError> {
        let io_error = |source| CredentialError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            CredentialError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(io_error)?;
        file.write_all(content.as_bytes()).map_err(io_error)?;

        // mode() only applies to newly created files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(io_error)?;
        }

        Ok(())
    }
}
