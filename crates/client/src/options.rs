//! Engine timing and sizing knobs.

use crate::audio::DEFAULT_CACHE_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Wait after startup before the entry sound, so the page can settle.
    pub entry_delay_ms: u32,
    /// How long a matched exit sound holds back navigation.
    pub exit_delay_ms: u32,
    /// Automatic unlock attempts before the manual prompt appears.
    pub unlock_attempts: u32,
    pub unlock_spacing_ms: u32,
    /// Registry sounds decoded ahead of time.
    pub preload_count: usize,
    pub cache_capacity: usize,
    /// `nova-sound-playing` on the triggering element.
    pub element_effect_ms: u32,
    /// `active` on the page-level sound wave.
    pub wave_effect_ms: u32,
    pub notification_ms: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            entry_delay_ms: 150,
            exit_delay_ms: 300,
            unlock_attempts: 3,
            unlock_spacing_ms: 250,
            preload_count: 5,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            element_effect_ms: 500,
            wave_effect_ms: 1000,
            notification_ms: 2000,
        }
    }
}
