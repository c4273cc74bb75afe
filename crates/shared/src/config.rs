//! Site-level configuration handed to the engine at startup.

use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::models::UserPreferences;

fn default_true() -> bool {
    true
}

fn default_volume() -> u8 {
    50
}

/// Settings published by the site owner.
///
/// Accepts the admin layer's snake_case keys as well as camelCase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    #[serde(alias = "enable_sounds", default, deserialize_with = "lenient::flag")]
    pub enable_sounds: bool,
    #[serde(
        alias = "default_volume",
        default = "default_volume",
        deserialize_with = "lenient::percent"
    )]
    pub default_volume: u8,
    #[serde(alias = "mobile_enabled", default, deserialize_with = "lenient::flag")]
    pub mobile_enabled: bool,
    #[serde(
        alias = "respect_prefers_reduced_motion",
        alias = "respectPrefersReducedMotion",
        default = "default_true",
        deserialize_with = "lenient::flag"
    )]
    pub respect_reduced_motion: bool,
    #[serde(alias = "preview_mode", default, deserialize_with = "lenient::flag")]
    pub preview_mode: bool,
    #[serde(
        alias = "show_visual_feedback",
        default = "default_true",
        deserialize_with = "lenient::flag"
    )]
    pub show_visual_feedback: bool,
    #[serde(
        alias = "preload_sounds",
        default = "default_true",
        deserialize_with = "lenient::flag"
    )]
    pub preload_sounds: bool,
    #[serde(
        alias = "require_consent",
        default = "default_true",
        deserialize_with = "lenient::flag"
    )]
    pub require_consent: bool,
    /// Endpoint returning the rule feeds as JSON, used by `reload()`.
    #[serde(
        alias = "feeds_url",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub feeds_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            enable_sounds: true,
            default_volume: default_volume(),
            mobile_enabled: false,
            respect_reduced_motion: true,
            preview_mode: false,
            show_visual_feedback: true,
            preload_sounds: true,
            require_consent: true,
            feeds_url: None,
        }
    }
}

/// Facts about the visitor and device, gathered by the host page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Environment {
    pub is_mobile: bool,
    pub prefers_reduced_motion: bool,
    /// The visitor may see preview-mode sounds (site administrator).
    pub privileged: bool,
}

/// Why the engine stays dormant for this page view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    SoundsDisabled,
    PreviewMode,
    MobileDisabled,
    ReducedMotion,
    UserDisabled,
}

impl std::fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DisabledReason::SoundsDisabled => "sounds are disabled for this site",
            DisabledReason::PreviewMode => "preview mode is limited to administrators",
            DisabledReason::MobileDisabled => "sounds are disabled on mobile devices",
            DisabledReason::ReducedMotion => "visitor prefers reduced motion",
            DisabledReason::UserDisabled => "visitor disabled sounds",
        };
        f.write_str(text)
    }
}

impl SiteConfig {
    /// Decide whether the engine runs at all for this page view.
    pub fn activation(
        &self,
        env: &Environment,
        prefs: &UserPreferences,
    ) -> Result<(), DisabledReason> {
        if !self.enable_sounds {
            return Err(DisabledReason::SoundsDisabled);
        }
        if self.preview_mode && !env.privileged {
            return Err(DisabledReason::PreviewMode);
        }
        if env.is_mobile && !self.mobile_enabled {
            return Err(DisabledReason::MobileDisabled);
        }
        if self.respect_reduced_motion && env.prefers_reduced_motion {
            return Err(DisabledReason::ReducedMotion);
        }
        if prefs.disabled {
            return Err(DisabledReason::UserDisabled);
        }
        Ok(())
    }

    /// Preferences used when nothing has been stored yet.
    pub fn default_preferences(&self) -> UserPreferences {
        UserPreferences::with_volume(self.default_volume)
    }
}
