//! Sound playback through a single master gain, with a media-element fallback.
//!
//! The engine owns the decoded-buffer cache and the unlock bookkeeping. It is
//! deliberately forgiving: nothing here returns an error to callers, playback
//! resolves to a [`PlayOutcome`] instead.

mod backend;
mod cache;

#[cfg(target_arch = "wasm32")]
pub mod web;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures_util::future::{LocalBoxFuture, Shared};
use futures_util::FutureExt;

pub use backend::{AudioBackend, AudioError, ContextState};
pub use cache::BufferCache;

#[cfg(target_arch = "wasm32")]
pub use web::WebAudioBackend;

/// Per-request playback options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    /// Per-playback gain in `0.0..=1.0`, applied before the master gain.
    pub volume: f32,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

impl PlayOptions {
    /// Options for a caller-supplied gain. Anything that is not a finite
    /// number falls back to full gain.
    pub fn gain(volume: f64) -> Self {
        Self {
            volume: volume as f32,
        }
        .sanitized()
    }

    /// The gain actually applied: clamped into `0.0..=1.0`, never NaN.
    pub fn sanitized(self) -> Self {
        let volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            PlayOptions::default().volume
        };
        Self { volume }
    }

    /// Options for a rule volume given in percent.
    pub fn percent(volume: u8) -> Self {
        Self {
            volume: f32::from(volume.min(100)) / 100.0,
        }
    }
}

/// How a playback request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Played through the decoded-buffer path.
    Played,
    /// Decoded path failed; the media-element fallback played instead.
    FellBack,
    /// Nothing was attempted.
    Skipped(SkipReason),
    /// Both paths failed; the failure was logged and swallowed.
    Failed,
}

impl PlayOutcome {
    pub fn is_audible(self) -> bool {
        matches!(self, PlayOutcome::Played | PlayOutcome::FellBack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyUrl,
    Muted,
    /// The engine is dormant or consent does not allow sound.
    NotPermitted,
}

/// Ways to get a suspended audio context running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockTechnique {
    /// Start a silent buffer right away; works if the tab already saw a gesture.
    SilentBuffer,
    /// Resume when the page becomes visible or focused again.
    FocusResume,
    /// Resume from inside a genuine click/touch/key handler.
    GestureResume,
}

/// Audible loudness of a request: per-playback gain times master percent.
pub fn effective_volume(gain: f32, master_percent: u8) -> f32 {
    PlayOptions { volume: gain }.sanitized().volume * f32::from(master_percent.min(100)) / 100.0
}

type SharedLoad<T> = Shared<LocalBoxFuture<'static, Result<T, AudioError>>>;

/// Default number of decoded buffers kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

pub struct AudioEngine<B: AudioBackend> {
    backend: Rc<B>,
    cache: RefCell<BufferCache<B::Buffer>>,
    /// Decodes in progress; concurrent requests for one url share one decode.
    inflight: RefCell<HashMap<String, SharedLoad<B::Buffer>>>,
    volume: Cell<u8>,
    muted: Cell<bool>,
    unlocked: Cell<bool>,
}

impl<B: AudioBackend> AudioEngine<B> {
    pub fn new(backend: B, volume: u8, muted: bool) -> Self {
        Self::with_cache_capacity(backend, volume, muted, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(backend: B, volume: u8, muted: bool, capacity: usize) -> Self {
        let engine = Self {
            backend: Rc::new(backend),
            cache: RefCell::new(BufferCache::new(capacity)),
            inflight: RefCell::new(HashMap::new()),
            volume: Cell::new(volume.min(100)),
            muted: Cell::new(muted),
            unlocked: Cell::new(false),
        };
        engine.apply_master_gain();
        engine
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // --- Gain staging ---

    /// Set the master volume in percent, clamped to `0..=100`. Returns the stored value.
    pub fn set_master_volume(&self, percent: i32) -> u8 {
        let clamped = percent.clamp(0, 100) as u8;
        self.volume.set(clamped);
        self.apply_master_gain();
        clamped
    }

    pub fn volume(&self) -> u8 {
        self.volume.get()
    }

    pub fn mute(&self) {
        self.muted.set(true);
        self.apply_master_gain();
    }

    pub fn unmute(&self) {
        self.muted.set(false);
        self.apply_master_gain();
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    fn apply_master_gain(&self) {
        let gain = if self.muted.get() {
            0.0
        } else {
            f32::from(self.volume.get()) / 100.0
        };
        self.backend.set_master_gain(gain);
    }

    // --- Playback ---

    /// Play `url`. Never fails: problems fall back to a media element and are
    /// then logged and swallowed.
    pub async fn play(&self, url: &str, options: PlayOptions) -> PlayOutcome {
        if url.trim().is_empty() {
            return PlayOutcome::Skipped(SkipReason::EmptyUrl);
        }
        if self.muted.get() {
            return PlayOutcome::Skipped(SkipReason::Muted);
        }
        let gain = options.sanitized().volume;

        match self.play_buffered(url, gain).await {
            Ok(()) => PlayOutcome::Played,
            Err(e) => {
                crate::log_warn!("Web Audio playback of {} failed ({}), using fallback", url, e);
                let volume = effective_volume(gain, self.volume.get());
                match self.backend.play_element(url, volume).await {
                    Ok(()) => PlayOutcome::FellBack,
                    Err(e) => {
                        crate::log_error!("Fallback audio for {} failed: {}", url, e);
                        PlayOutcome::Failed
                    }
                }
            }
        }
    }

    async fn play_buffered(&self, url: &str, gain: f32) -> Result<(), AudioError> {
        match self.backend.context_state() {
            ContextState::Closed => {
                return Err(AudioError::Unavailable("audio context is closed".into()))
            }
            ContextState::Suspended => self.backend.resume().await?,
            ContextState::Running => {}
        }
        let buffer = self.buffer(url).await?;
        self.backend.start(&buffer, gain)
    }

    /// Decoded buffer for `url`, from cache or a (shared) fresh decode.
    pub async fn buffer(&self, url: &str) -> Result<B::Buffer, AudioError> {
        if let Some(buffer) = self.cache.borrow_mut().get(url) {
            return Ok(buffer);
        }

        let load = self
            .inflight
            .borrow_mut()
            .entry(url.to_string())
            .or_insert_with(|| {
                let backend = Rc::clone(&self.backend);
                let url = url.to_string();
                async move { backend.load(&url).await }
                    .boxed_local()
                    .shared()
            })
            .clone();

        let result = load.await;
        self.inflight.borrow_mut().remove(url);
        if let Ok(buffer) = &result {
            self.cache.borrow_mut().insert(url, buffer.clone());
        }
        result
    }

    /// Decode the first `limit` urls ahead of time. Failures are logged only.
    pub async fn preload(&self, urls: &[String], limit: usize) {
        for url in urls.iter().take(limit) {
            if let Err(e) = self.buffer(url).await {
                crate::log_warn!("Failed to preload sound {}: {}", url, e);
            }
        }
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.cache.borrow().contains(url)
    }

    // --- Unlocking ---

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.get()
    }

    /// Try one unlock technique. Idempotent; short-circuits once unlocked.
    pub async fn attempt_unlock(&self, technique: UnlockTechnique) -> bool {
        if self.unlocked.get() {
            return true;
        }
        if self.backend.context_state() == ContextState::Closed {
            return false;
        }

        let result = match technique {
            UnlockTechnique::SilentBuffer => match self.backend.play_silence() {
                Ok(()) => self.resume_if_suspended().await,
                Err(e) => Err(e),
            },
            UnlockTechnique::FocusResume => self.resume_if_suspended().await,
            UnlockTechnique::GestureResume => {
                // A buffer started inside the gesture is what some browsers key on.
                let _ = self.backend.play_silence();
                self.resume_if_suspended().await
            }
        };

        match result {
            Ok(()) if self.backend.context_state() == ContextState::Running => {
                self.unlocked.set(true);
                crate::log_info!("Audio unlocked via {:?}", technique);
                true
            }
            Ok(()) => false,
            Err(e) => {
                crate::log_debug!("Unlock technique {:?} failed: {}", technique, e);
                false
            }
        }
    }

    async fn resume_if_suspended(&self) -> Result<(), AudioError> {
        if self.backend.context_state() == ContextState::Suspended {
            self.backend.resume().await?;
        }
        Ok(())
    }

    /// Release the audio context and drop cached buffers.
    pub fn close(&self) {
        self.backend.close();
        self.cache.borrow_mut().clear();
        self.inflight.borrow_mut().clear();
        self.unlocked.set(false);
    }
}
