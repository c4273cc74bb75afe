//! Nova Sound FX client engine.
//!
//! Binds sounds to page elements and page transitions, gated by visitor
//! consent and preferences. Browser hosts live in the `web` submodules and
//! are only compiled for `wasm32`; everything else runs (and is tested)
//! natively against the host traits.

#[macro_use]
pub mod logging;

pub mod audio;
pub mod consent;
pub mod feeds;
pub mod options;
pub mod page;
pub mod playback;
pub mod preferences;
pub mod runtime;
pub mod selector_rules;
pub mod sfx;
pub mod storage;
pub mod transitions;
pub mod widget;

#[cfg(test)]
mod testing;

pub use audio::{AudioBackend, AudioEngine, PlayOptions, PlayOutcome, SkipReason};
pub use consent::{ConsentState, LockState};
pub use feeds::{FeedSource, HttpFeed, StaticFeed};
pub use options::EngineOptions;
pub use page::PageHost;
pub use preferences::{PreferenceStore, SaveOutcome};
pub use runtime::Runtime;
pub use sfx::{Hosts, ReloadReport, SoundFx};
pub use storage::{MemoryStorage, PreferenceBackend, StorageError};
pub use transitions::TransitionTable;
