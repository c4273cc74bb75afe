//! The visitor's volume/mute/consent record and its persistence.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use novasound_shared::{PreferencePatch, UserPreferences};

use crate::storage::{self, PreferenceBackend, PREFERENCES_KEY};

/// Where a save ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Primary,
    Fallback,
    /// No backend accepted the write; preferences live until the tab closes.
    SessionOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type PreferencesListener = Rc<dyn Fn(&UserPreferences)>;

/// Preferences with a fixed backend order: primary, then fallback, then defaults.
pub struct PreferenceStore {
    primary: Box<dyn PreferenceBackend>,
    fallback: Option<Box<dyn PreferenceBackend>>,
    defaults: UserPreferences,
    current: RefCell<UserPreferences>,
    subscribers: RefCell<Vec<(SubscriptionId, PreferencesListener)>>,
    next_id: Cell<u64>,
}

impl PreferenceStore {
    pub fn new(
        primary: Box<dyn PreferenceBackend>,
        fallback: Option<Box<dyn PreferenceBackend>>,
        defaults: UserPreferences,
    ) -> Self {
        Self {
            primary,
            fallback,
            current: RefCell::new(defaults.clone()),
            defaults,
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Read stored preferences into the store. Never fails.
    pub fn load(&self) -> UserPreferences {
        let stored = self.read_from(self.primary.as_ref()).or_else(|| {
            self.fallback
                .as_deref()
                .and_then(|fallback| self.read_from(fallback))
        });

        let prefs = match stored {
            Some(patch) => self.defaults.clone().merged_with(&patch),
            None => self.defaults.clone(),
        };
        *self.current.borrow_mut() = prefs.clone();
        prefs
    }

    fn read_from(&self, backend: &dyn PreferenceBackend) -> Option<PreferencePatch> {
        match storage::load::<PreferencePatch>(backend, PREFERENCES_KEY) {
            Ok(Some(patch)) => {
                crate::log_debug!("Loaded preferences from {} storage", backend.name());
                Some(patch)
            }
            Ok(None) => None,
            Err(e) => {
                crate::log_debug!("Preferences not readable: {}", e);
                None
            }
        }
    }

    pub fn current(&self) -> UserPreferences {
        self.current.borrow().clone()
    }

    /// Change the in-memory record without persisting it.
    pub fn update(&self, change: impl FnOnce(&mut UserPreferences)) -> UserPreferences {
        let mut current = self.current.borrow_mut();
        change(&mut current);
        current.volume = current.volume.min(100);
        current.clone()
    }

    /// Persist the current record and notify subscribers.
    pub fn save(&self) -> SaveOutcome {
        let prefs = self.current();
        let outcome = self.write(&prefs);
        self.notify(&prefs);
        outcome
    }

    fn write(&self, prefs: &UserPreferences) -> SaveOutcome {
        let primary_err = match storage::save(self.primary.as_ref(), PREFERENCES_KEY, prefs) {
            Ok(()) => return SaveOutcome::Primary,
            Err(e) => e,
        };
        crate::log_warn!("Saving preferences failed ({}), trying fallback", primary_err);

        let Some(fallback) = self.fallback.as_deref() else {
            return SaveOutcome::SessionOnly;
        };
        match storage::save(fallback, PREFERENCES_KEY, prefs) {
            Ok(()) => SaveOutcome::Fallback,
            Err(e) => {
                crate::log_warn!("Preferences kept for this session only: {}", e);
                SaveOutcome::SessionOnly
            }
        }
    }

    /// Forget stored preferences and return to defaults.
    pub fn reset(&self) -> UserPreferences {
        let _ = self.primary.remove(PREFERENCES_KEY);
        if let Some(fallback) = &self.fallback {
            let _ = fallback.remove(PREFERENCES_KEY);
        }
        let prefs = self.defaults.clone();
        *self.current.borrow_mut() = prefs.clone();
        self.notify(&prefs);
        prefs
    }

    // --- "preferences-saved" notification ---

    pub fn subscribe(&self, listener: PreferencesListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.borrow_mut().retain(|(sub, _)| *sub != id);
    }

    fn notify(&self, prefs: &UserPreferences) {
        let listeners: Vec<PreferencesListener> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(prefs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use novasound_shared::Consent;

    fn store(primary: MemoryStorage, fallback: MemoryStorage) -> PreferenceStore {
        PreferenceStore::new(
            Box::new(primary),
            Some(Box::new(fallback)),
            UserPreferences::with_volume(50),
        )
    }

    #[test]
    fn test_load_falls_through_to_defaults() {
        let store = store(MemoryStorage::new(), MemoryStorage::new());
        assert_eq!(store.load(), UserPreferences::with_volume(50));
    }

    #[test]
    fn test_load_prefers_primary_then_fallback() {
        let primary = MemoryStorage::new().with_entry(PREFERENCES_KEY, r#"{"volume":20}"#);
        let fallback = MemoryStorage::new().with_entry(PREFERENCES_KEY, r#"{"volume":90}"#);
        assert_eq!(store(primary, fallback).load().volume, 20);

        let fallback =
            MemoryStorage::new().with_entry(PREFERENCES_KEY, r#"{"volume":"90","muted":true}"#);
        let prefs = store(MemoryStorage::new(), fallback).load();
        assert_eq!(prefs.volume, 90);
        assert!(prefs.muted);
        assert_eq!(prefs.consent, Consent::Unset);
    }

    #[test]
    fn test_corrupt_primary_uses_fallback() {
        let primary = MemoryStorage::new().with_entry(PREFERENCES_KEY, "garbage");
        let fallback = MemoryStorage::new().with_entry(PREFERENCES_KEY, r#"{"consent":"denied"}"#);
        assert_eq!(store(primary, fallback).load().consent, Consent::Denied);
    }

    #[test]
    fn test_save_falls_back_when_primary_denied() {
        let store = store(MemoryStorage::read_only(), MemoryStorage::new());
        store.update(|p| p.volume = 70);
        assert_eq!(store.save(), SaveOutcome::Fallback);
        assert_eq!(store.load().volume, 70);
    }

    #[test]
    fn test_save_session_only_when_everything_fails() {
        let store = store(MemoryStorage::read_only(), MemoryStorage::read_only());
        store.update(|p| p.muted = true);
        assert_eq!(store.save(), SaveOutcome::SessionOnly);
        assert!(store.current().muted);
    }

    #[test]
    fn test_save_notifies_subscribers() {
        let store = store(MemoryStorage::new(), MemoryStorage::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(Rc::new(move |p: &UserPreferences| sink.borrow_mut().push(p.volume)));

        store.update(|p| p.volume = 33);
        assert_eq!(store.save(), SaveOutcome::Primary);
        store.unsubscribe(id);
        store.save();

        assert_eq!(*seen.borrow(), vec![33]);
    }

    #[test]
    fn test_reset_clears_both_backends() {
        let store = store(MemoryStorage::new(), MemoryStorage::new());
        store.update(|p| p.consent = Consent::Granted);
        store.save();
        store.reset();
        assert_eq!(store.load().consent, Consent::Unset);
    }
}
