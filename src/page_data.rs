//! The globals a site prints into the page, decoded.
//!
//! Two objects are published: `novaSoundFX` (settings, device facts and the
//! sound registry) and `NovaSoundFXData` (the rule feeds). Both are produced
//! by a PHP layer, so empty maps may arrive as `[]` and flags as `"1"`.

use std::collections::HashMap;

use novasound_shared::{lenient, Environment, SiteConfig, SoundFeeds};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Name of the settings global.
pub const GLOBALS_NAME: &str = "novaSoundFX";
/// Name of the rule feed global.
pub const RULES_NAME: &str = "NovaSoundFXData";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGlobals {
    #[serde(default, deserialize_with = "object_or_default")]
    pub settings: SiteConfig,
    #[serde(default, alias = "is_mobile", deserialize_with = "lenient::flag")]
    pub is_mobile: bool,
    /// Whether the viewer may see preview-mode sounds, when the site says so.
    #[serde(default, alias = "is_privileged")]
    pub is_privileged: Option<bool>,
    #[serde(default, deserialize_with = "sound_map")]
    pub sounds: HashMap<String, String>,
}

/// Rule rows as printed; decoded row by row in [`PageData::feeds`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleData {
    #[serde(default, alias = "css_mappings", deserialize_with = "lenient::rows")]
    pub css_mappings: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::rows")]
    pub transitions: Vec<Value>,
}

/// Everything the bundle reads from the page at startup.
#[derive(Debug, Clone, Default)]
pub struct PageData {
    pub globals: PageGlobals,
    /// `None` when the site printed no rules for this viewer.
    pub rules: Option<RuleData>,
}

impl PageData {
    pub fn parse(globals: &str, rules: Option<&str>) -> Result<Self, serde_json::Error> {
        let globals: PageGlobals = serde_json::from_str(globals)?;
        let rules = rules.map(serde_json::from_str::<RuleData>).transpose()?;
        Ok(Self { globals, rules })
    }

    pub fn settings(&self) -> &SiteConfig {
        &self.globals.settings
    }

    /// The site only prints rules in preview mode for viewers allowed to hear
    /// them, so their presence stands in for an explicit privilege flag.
    pub fn environment(&self, prefers_reduced_motion: bool) -> Environment {
        Environment {
            is_mobile: self.globals.is_mobile,
            prefers_reduced_motion,
            privileged: self.globals.is_privileged.unwrap_or(self.rules.is_some()),
        }
    }

    pub fn feeds(&self) -> SoundFeeds {
        let rules = self.rules.clone().unwrap_or_default();
        SoundFeeds::from_rows(rules.css_mappings, rules.transitions, self.globals.sounds.clone())
    }
}

/// An object, or `[]` standing in for an empty one.
fn object_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(T::default()),
        Value::Array(items) if items.is_empty() => Ok(T::default()),
        other => serde_json::from_value(other).map_err(D::Error::custom),
    }
}

/// Sound id to url. A list is keyed by position.
fn sound_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<(String, Value)> = match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => return Err(D::Error::custom(format!("expected a sound map, got {other}"))),
    };
    Ok(entries
        .into_iter()
        .filter_map(|(id, url)| match url {
            Value::String(url) if !url.trim().is_empty() => Some((id, url)),
            _ => None,
        })
        .collect())
}
