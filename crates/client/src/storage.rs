//! Preference storage.
//!
//! Every backend stores raw strings under a key; [`save`] and [`load`] add the
//! JSON layer on top:
//! - Web: `localStorage`, with a one-year cookie as the fallback backend
//! - Anywhere: an in-memory map, for pages where nothing durable is allowed

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Storage key of the visitor's preferences record.
pub const PREFERENCES_KEY: &str = "nova_sound_fx_preferences";

/// Lifetime of the fallback cookie.
pub const COOKIE_MAX_AGE_DAYS: i64 = 365;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{0} storage is unavailable")]
    Unavailable(&'static str),
    #[error("{backend} storage refused the write: {reason}")]
    Denied {
        backend: &'static str,
        reason: String,
    },
    #[error("failed to serialize value: {0}")]
    Serialize(String),
}

/// A key/value string store.
pub trait PreferenceBackend {
    fn name(&self) -> &'static str;
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: PreferenceBackend + ?Sized> PreferenceBackend for std::rc::Rc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Serialize `value` as JSON and write it to `backend`.
pub fn save<T: Serialize>(
    backend: &dyn PreferenceBackend,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|e| StorageError::Serialize(e.to_string()))?;
    backend.write(key, &json)
}

/// Read and deserialize a value.
///
/// Returns `Ok(None)` if the key doesn't exist or the stored JSON is unreadable.
pub fn load<T: DeserializeOwned>(
    backend: &dyn PreferenceBackend,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(json) = backend.read(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&json) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            crate::log_warn!("Ignoring unreadable {} entry {}: {}", backend.name(), key, e);
            Ok(None)
        }
    }
}

// =========================================
// Cookie encoding
// =========================================

/// A `document.cookie` assignment for `name=value`, valid for the whole site.
pub fn format_cookie(name: &str, value: &str, expires: DateTime<Utc>) -> String {
    format!(
        "{}={};expires={};path=/;SameSite=Lax",
        name,
        urlencoding::encode(value),
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// Value of cookie `name` in a `document.cookie` string.
pub fn parse_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
        .map(|raw| match urlencoding::decode(raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => raw.to_string(),
        })
}

// =========================================
// In-memory implementation
// =========================================

/// Session-only storage. `read_only` stores reject every write.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            read_only: true,
        }
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl PreferenceBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::Denied {
                backend: self.name(),
                reason: "read-only".into(),
            });
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

// =========================================
// Web (WASM) implementation
// =========================================

#[cfg(target_arch = "wasm32")]
pub use web::{CookieStorage, LocalStorage};

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::JsCast;
    use web_sys::HtmlDocument;

    use super::*;

    /// Browsers drop cookies larger than this.
    const MAX_COOKIE_BYTES: usize = 4096;

    fn cookie_expiry() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::days(COOKIE_MAX_AGE_DAYS)
    }

    /// `window.localStorage`.
    #[derive(Debug, Default)]
    pub struct LocalStorage;

    impl LocalStorage {
        fn storage(&self) -> Result<web_sys::Storage, StorageError> {
            web_sys::window()
                .and_then(|w| w.local_storage().ok().flatten())
                .ok_or(StorageError::Unavailable("local"))
        }
    }

    impl PreferenceBackend for LocalStorage {
        fn name(&self) -> &'static str {
            "local"
        }

        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(self.storage()?.get_item(key).ok().flatten())
        }

        fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.storage()?
                .set_item(key, value)
                .map_err(|e| StorageError::Denied {
                    backend: self.name(),
                    reason: format!("{:?}", e),
                })
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            let _ = self.storage()?.remove_item(key);
            Ok(())
        }
    }

    /// `document.cookie`, JSON url-encoded, one-year expiry.
    #[derive(Debug, Default)]
    pub struct CookieStorage;

    impl CookieStorage {
        fn document(&self) -> Result<HtmlDocument, StorageError> {
            web_sys::window()
                .and_then(|w| w.document())
                .and_then(|d| d.dyn_into::<HtmlDocument>().ok())
                .ok_or(StorageError::Unavailable("cookie"))
        }
    }

    impl PreferenceBackend for CookieStorage {
        fn name(&self) -> &'static str {
            "cookie"
        }

        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            let cookies = self.document()?.cookie().unwrap_or_default();
            Ok(parse_cookie(&cookies, key))
        }

        fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
            let cookie = format_cookie(key, value, cookie_expiry());
            if cookie.len() > MAX_COOKIE_BYTES {
                return Err(StorageError::Denied {
                    backend: self.name(),
                    reason: format!("cookie of {} bytes is too large", cookie.len()),
                });
            }
            let document = self.document()?;
            document
                .set_cookie(&cookie)
                .map_err(|e| StorageError::Denied {
                    backend: self.name(),
                    reason: format!("{:?}", e),
                })?;

            // Blocked cookies are dropped silently; read back to find out.
            let stored = parse_cookie(&document.cookie().unwrap_or_default(), key);
            if stored.as_deref() == Some(value) {
                Ok(())
            } else {
                Err(StorageError::Denied {
                    backend: self.name(),
                    reason: "cookies are disabled".into(),
                })
            }
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            let expired = DateTime::<Utc>::UNIX_EPOCH;
            let _ = self.document()?.set_cookie(&format_cookie(key, "", expired));
            Ok(())
        }
    }
}
