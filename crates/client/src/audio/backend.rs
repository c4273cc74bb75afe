//! The platform audio API, as seen by [`AudioEngine`](super::AudioEngine).

use async_trait::async_trait;
use thiserror::Error;

/// Audio failures. All of them are recoverable: the engine falls back or gives up quietly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    #[error("failed to fetch {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("playback blocked by autoplay policy: {0}")]
    Policy(String),
}

/// State of the underlying audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// A decoding, gain-staged audio output with a simple media-element fallback.
///
/// One master gain node is owned by the backend; every `start` chains a fresh
/// per-playback gain node into it.
#[async_trait(?Send)]
pub trait AudioBackend: 'static {
    /// Decoded, immutable sound data.
    type Buffer: Clone + 'static;

    fn context_state(&self) -> ContextState;

    async fn resume(&self) -> Result<(), AudioError>;

    /// Start a one-sample silent buffer; unlocks output if a gesture already happened.
    fn play_silence(&self) -> Result<(), AudioError>;

    /// Fetch and decode the sound at `url`.
    async fn load(&self, url: &str) -> Result<Self::Buffer, AudioError>;

    /// Play `buffer` through a per-playback gain of `gain` into the master gain.
    fn start(&self, buffer: &Self::Buffer, gain: f32) -> Result<(), AudioError>;

    fn set_master_gain(&self, gain: f32);

    /// Fallback: play `url` through a plain media element, bypassing the master gain.
    async fn play_element(&self, url: &str, volume: f32) -> Result<(), AudioError>;

    fn close(&self);
}
