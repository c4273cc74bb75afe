//! Rule and preference data model shared by the engine and the tooling.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuleError;
use crate::lenient;

// --- Sounds ---

/// A playable audio resource owned by the external asset registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoundAsset {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

// --- Selector rules ---

/// DOM interaction a selector rule reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Hover,
    Click,
    /// Pressed and held; fires once per press.
    Active,
    Focus,
    Blur,
    MouseEnter,
    MouseLeave,
    MouseDown,
    MouseUp,
    /// Any other native event name, passed through untouched.
    Native(String),
}

/// Native event names a rule listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBinding {
    /// Events that fire the sound.
    pub trigger: &'static [&'static str],
    /// Events that re-arm a held trigger (only used by [`EventKind::Active`]).
    pub release: &'static [&'static str],
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Hover => "hover",
            EventKind::Click => "click",
            EventKind::Active => "active",
            EventKind::Focus => "focus",
            EventKind::Blur => "blur",
            EventKind::MouseEnter => "mouseenter",
            EventKind::MouseLeave => "mouseleave",
            EventKind::MouseDown => "mousedown",
            EventKind::MouseUp => "mouseup",
            EventKind::Native(name) => name,
        }
    }

    /// Whether a press must be released before the rule can fire again.
    pub fn is_held(&self) -> bool {
        matches!(self, EventKind::Active)
    }

    /// Native event names for the fixed kinds. `Native` kinds use their own name
    /// and are handled by [`EventKind::trigger_events`].
    pub fn binding(&self) -> Option<EventBinding> {
        const NONE: &[&str] = &[];
        let trigger: &'static [&'static str] = match self {
            EventKind::Hover | EventKind::MouseEnter => &["mouseenter"],
            EventKind::Active => {
                return Some(EventBinding {
                    trigger: &["mousedown", "touchstart"],
                    release: &["mouseup", "touchend", "mouseleave"],
                })
            }
            EventKind::Click => &["click"],
            EventKind::Focus => &["focus"],
            EventKind::Blur => &["blur"],
            EventKind::MouseLeave => &["mouseleave"],
            EventKind::MouseDown => &["mousedown"],
            EventKind::MouseUp => &["mouseup"],
            EventKind::Native(_) => return None,
        };
        Some(EventBinding {
            trigger,
            release: NONE,
        })
    }

    /// Native events that fire the sound.
    pub fn trigger_events(&self) -> Vec<String> {
        match self.binding() {
            Some(binding) => binding.trigger.iter().map(|s| s.to_string()).collect(),
            None => vec![self.as_str().to_string()],
        }
    }

    /// Native events that release a held trigger.
    pub fn release_events(&self) -> Vec<String> {
        self.binding()
            .map(|binding| binding.release.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hover" => EventKind::Hover,
            "click" => EventKind::Click,
            "active" => EventKind::Active,
            "focus" => EventKind::Focus,
            "blur" => EventKind::Blur,
            "mouseenter" => EventKind::MouseEnter,
            "mouseleave" => EventKind::MouseLeave,
            "mousedown" => EventKind::MouseDown,
            "mouseup" => EventKind::MouseUp,
            other => EventKind::Native(other.to_string()),
        }
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.as_str().to_string()
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(EventKind::from)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_volume() -> u8 {
    100
}

fn default_true() -> bool {
    true
}

/// Binds a sound to a CSS selector and a DOM event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRule {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(alias = "css_selector")]
    pub selector: String,
    #[serde(alias = "event_type")]
    pub event_type: EventKind,
    #[serde(alias = "sound_id", default, deserialize_with = "lenient::string")]
    pub sound_id: String,
    #[serde(
        alias = "sound_url",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sound_url: Option<String>,
    #[serde(default = "default_volume", deserialize_with = "lenient::percent")]
    pub volume: u8,
    #[serde(alias = "delay", default, deserialize_with = "lenient::millis")]
    pub delay_ms: u32,
    #[serde(
        alias = "show_visual_effect",
        default = "default_true",
        deserialize_with = "lenient::flag"
    )]
    pub show_visual_effect: bool,
    #[serde(
        alias = "show_speaker_icon",
        default = "default_true",
        deserialize_with = "lenient::flag"
    )]
    pub show_speaker_icon: bool,
}

// --- Transition rules ---

/// Navigation direction a transition rule applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Enter,
    Exit,
    Both,
}

/// The direction being evaluated for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Entry,
    Exit,
}

impl TransitionType {
    pub fn applies_to(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (TransitionType::Both, _)
                | (TransitionType::Enter, Direction::Entry)
                | (TransitionType::Exit, Direction::Exit)
        )
    }
}

/// Binds a sound to page entry and/or exit for URLs matching a pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRule {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(alias = "url_pattern")]
    pub url_pattern: String,
    #[serde(alias = "transition_type")]
    pub transition_type: TransitionType,
    #[serde(alias = "sound_id", default, deserialize_with = "lenient::string")]
    pub sound_id: String,
    #[serde(
        alias = "sound_url",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sound_url: Option<String>,
    #[serde(default = "default_volume", deserialize_with = "lenient::percent")]
    pub volume: u8,
    #[serde(default, deserialize_with = "lenient::int")]
    pub priority: i32,
}

/// Rules that carry a sound reference.
pub trait SoundRef {
    fn rule_id(&self) -> &str;
    fn sound_id(&self) -> &str;
    fn inline_url(&self) -> Option<&str>;
}

impl SoundRef for SelectorRule {
    fn rule_id(&self) -> &str {
        &self.id
    }
    fn sound_id(&self) -> &str {
        &self.sound_id
    }
    fn inline_url(&self) -> Option<&str> {
        self.sound_url.as_deref()
    }
}

impl SoundRef for TransitionRule {
    fn rule_id(&self) -> &str {
        &self.id
    }
    fn sound_id(&self) -> &str {
        &self.sound_id
    }
    fn inline_url(&self) -> Option<&str> {
        self.sound_url.as_deref()
    }
}

/// A rule whose sound has been resolved to a playable url.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<R> {
    pub rule: R,
    pub sound_url: String,
}

// --- Feeds ---

/// The two rule feeds plus the optional sound registry, as supplied by the admin layer.
///
/// Rows are decoded one at a time: a malformed row lands in `rejected` and the
/// rest of the feed still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "RawFeeds")]
pub struct SoundFeeds {
    pub css_mappings: Vec<SelectorRule>,
    pub transitions: Vec<TransitionRule>,
    /// Sound id to url.
    pub sounds: HashMap<String, String>,
    /// Rows that could not be decoded.
    #[serde(skip)]
    pub rejected: Vec<RuleError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeeds {
    #[serde(default, alias = "css_mappings", deserialize_with = "lenient::rows")]
    css_mappings: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::rows")]
    transitions: Vec<Value>,
    #[serde(default)]
    sounds: HashMap<String, String>,
}

impl From<RawFeeds> for SoundFeeds {
    fn from(raw: RawFeeds) -> Self {
        SoundFeeds::from_rows(raw.css_mappings, raw.transitions, raw.sounds)
    }
}

/// Feeds after sound resolution; every rule here has a url.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFeeds {
    pub selectors: Vec<Resolved<SelectorRule>>,
    pub transitions: Vec<Resolved<TransitionRule>>,
    /// Registry urls in feed order, used for preloading.
    pub sound_urls: Vec<String>,
}

fn decode_rows<R: DeserializeOwned>(
    rows: Vec<Value>,
    list: &str,
    rejected: &mut Vec<RuleError>,
) -> Vec<R> {
    let mut decoded = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let rule_id = match row.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => format!("{list}[{index}]"),
        };
        match serde_json::from_value(lenient::without_nulls(row)) {
            Ok(rule) => decoded.push(rule),
            Err(e) => rejected.push(RuleError::Malformed {
                rule_id,
                reason: e.to_string(),
            }),
        }
    }
    decoded
}

impl SoundFeeds {
    pub fn from_json(json: &str) -> Result<Self, crate::FeedError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode raw rule rows, keeping the ones that make sense.
    pub fn from_rows(
        css_mappings: Vec<Value>,
        transitions: Vec<Value>,
        sounds: HashMap<String, String>,
    ) -> Self {
        let mut rejected = Vec::new();
        let css_mappings = decode_rows(css_mappings, "cssMappings", &mut rejected);
        let transitions = decode_rows(transitions, "transitions", &mut rejected);
        Self {
            css_mappings,
            transitions,
            sounds,
            rejected,
        }
    }

    fn resolve_url<R: SoundRef>(&self, rule: &R) -> Result<String, RuleError> {
        if let Some(url) = rule.inline_url() {
            return Ok(url.to_string());
        }
        self.sounds
            .get(rule.sound_id())
            .filter(|url| !url.trim().is_empty())
            .cloned()
            .ok_or_else(|| RuleError::UnresolvedSound {
                rule_id: rule.rule_id().to_string(),
                sound_id: rule.sound_id().to_string(),
            })
    }

    /// Attach urls to every rule, dropping rules whose sound cannot be resolved.
    /// Rows rejected while decoding are reported first.
    pub fn resolve(&self) -> (ResolvedFeeds, Vec<RuleError>) {
        let mut errors = self.rejected.clone();
        let mut resolved = ResolvedFeeds::default();

        for rule in &self.css_mappings {
            match self.resolve_url(rule) {
                Ok(sound_url) => resolved.selectors.push(Resolved {
                    rule: rule.clone(),
                    sound_url,
                }),
                Err(e) => errors.push(e),
            }
        }
        for rule in &self.transitions {
            match self.resolve_url(rule) {
                Ok(sound_url) => resolved.transitions.push(Resolved {
                    rule: rule.clone(),
                    sound_url,
                }),
                Err(e) => errors.push(e),
            }
        }

        let mut ids: Vec<&String> = self.sounds.keys().collect();
        ids.sort_by(|a, b| {
            let numeric = |id: &str| id.parse::<u64>().unwrap_or(u64::MAX);
            numeric(a).cmp(&numeric(b)).then_with(|| a.cmp(b))
        });
        resolved.sound_urls = ids
            .into_iter()
            .filter_map(|id| self.sounds.get(id))
            .filter(|url| !url.trim().is_empty())
            .cloned()
            .collect();

        (resolved, errors)
    }
}

// --- Preferences ---

/// The visitor's answer to "may this site play sounds?".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    Granted,
    Denied,
    #[default]
    Unset,
}

/// Per-profile sound preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPreferences {
    pub volume: u8,
    pub muted: bool,
    pub disabled: bool,
    pub consent: Consent,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self::with_volume(50)
    }
}

impl UserPreferences {
    pub fn with_volume(volume: u8) -> Self {
        Self {
            volume: volume.min(100),
            muted: false,
            disabled: false,
            consent: Consent::Unset,
        }
    }

    /// Overlay a stored (possibly partial or older) record onto these defaults.
    ///
    /// Unknown keys are ignored and missing keys keep the default.
    pub fn merged_with(mut self, stored: &PreferencePatch) -> Self {
        if let Some(volume) = stored.volume {
            self.volume = volume;
        }
        if let Some(muted) = stored.muted {
            self.muted = muted;
        }
        if let Some(disabled) = stored.disabled {
            self.disabled = disabled;
        }
        if let Some(consent) = stored.consent {
            self.consent = consent;
        }
        self
    }
}

/// A stored preference record; every field optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PreferencePatch {
    #[serde(default, deserialize_with = "lenient::opt_percent")]
    pub volume: Option<u8>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub consent: Option<Consent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r##"{
        "cssMappings": [
            {"id":"1","css_selector":".btn","event_type":"hover","sound_id":"10","sound_url":"https://x.test/a.mp3","volume":"80","delay":"0","show_visual_effect":"1","show_speaker_icon":"0"},
            {"id":"2","css_selector":"#cta","event_type":"active","sound_id":"11","volume":60,"delay":120},
            {"id":"3","css_selector":".ghost","event_type":"click","sound_id":"99"}
        ],
        "transitions": [
            {"id":"4","url_pattern":"*/shop/*","transition_type":"both","sound_id":"10","volume":"70","priority":"10"}
        ],
        "sounds": {"10":"https://x.test/a.mp3","11":"https://x.test/b.mp3"}
    }"##;

    #[test]
    fn test_feed_decodes_admin_rows() {
        let feeds = SoundFeeds::from_json(FEED).unwrap();
        assert_eq!(feeds.css_mappings.len(), 3);

        let first = &feeds.css_mappings[0];
        assert_eq!(first.selector, ".btn");
        assert_eq!(first.event_type, EventKind::Hover);
        assert_eq!(first.volume, 80);
        assert!(first.show_visual_effect);
        assert!(!first.show_speaker_icon);

        let second = &feeds.css_mappings[1];
        assert_eq!(second.event_type, EventKind::Active);
        assert_eq!(second.delay_ms, 120);
        assert!(second.show_visual_effect, "missing flag defaults on");

        assert_eq!(feeds.transitions[0].transition_type, TransitionType::Both);
        assert_eq!(feeds.transitions[0].priority, 10);
    }

    #[test]
    fn test_resolution_drops_unresolvable_rules() {
        let feeds = SoundFeeds::from_json(FEED).unwrap();
        let (resolved, errors) = feeds.resolve();

        assert_eq!(resolved.selectors.len(), 2);
        assert_eq!(resolved.selectors[1].sound_url, "https://x.test/b.mp3");
        assert_eq!(resolved.transitions.len(), 1);
        assert_eq!(
            errors,
            vec![RuleError::UnresolvedSound {
                rule_id: "3".into(),
                sound_id: "99".into()
            }]
        );
        assert_eq!(
            resolved.sound_urls,
            vec!["https://x.test/a.mp3".to_string(), "https://x.test/b.mp3".to_string()]
        );
    }

    #[test]
    fn test_malformed_rows_are_skipped_individually() {
        let feeds = SoundFeeds::from_json(
            r##"{
                "cssMappings": [
                    {"id":"1","css_selector":".btn","event_type":"click","sound_id":"10","volume":null,"delay":null},
                    {"id":"2","css_selector":".bad","event_type":"click","sound_id":"10","volume":"loud"},
                    {"id":3,"event_type":"click","sound_id":"10"}
                ],
                "transitions": [
                    {"id":"4","url_pattern":"*","transition_type":"sideways","sound_id":"10"},
                    {"id":"5","url_pattern":"*","transition_type":"enter","sound_id":"10","priority":null}
                ],
                "sounds": {"10":"https://x.test/a.mp3"}
            }"##,
        )
        .unwrap();

        assert_eq!(feeds.css_mappings.len(), 1);
        assert_eq!(feeds.css_mappings[0].volume, 100);
        assert_eq!(feeds.css_mappings[0].delay_ms, 0);
        assert_eq!(feeds.transitions.len(), 1);
        assert_eq!(feeds.transitions[0].id, "5");

        let (resolved, errors) = feeds.resolve();
        assert_eq!(resolved.selectors.len(), 1);
        assert_eq!(resolved.transitions.len(), 1);
        let rejected: Vec<&str> = errors.iter().map(RuleError::rule_id).collect();
        assert_eq!(rejected, vec!["2", "3", "4"]);
        assert!(errors.iter().all(|e| matches!(e, RuleError::Malformed { .. })));
    }

    #[test]
    fn test_feed_shape_errors_still_fail() {
        assert!(SoundFeeds::from_json(r#"{"cssMappings": 5}"#).is_err());
        assert!(SoundFeeds::from_json("[1,2").is_err());
        let empty = SoundFeeds::from_json(r#"{"cssMappings": null}"#).unwrap();
        assert!(empty.css_mappings.is_empty());
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(EventKind::Hover.trigger_events(), vec!["mouseenter"]);
        assert_eq!(
            EventKind::Active.trigger_events(),
            vec!["mousedown", "touchstart"]
        );
        assert_eq!(
            EventKind::Active.release_events(),
            vec!["mouseup", "touchend", "mouseleave"]
        );
        assert_eq!(EventKind::Focus.trigger_events(), vec!["focus"]);
        assert!(EventKind::Click.release_events().is_empty());

        let custom = EventKind::from("dblclick".to_string());
        assert_eq!(custom, EventKind::Native("dblclick".into()));
        assert_eq!(custom.trigger_events(), vec!["dblclick"]);
    }

    #[test]
    fn test_transition_direction() {
        assert!(TransitionType::Both.applies_to(Direction::Entry));
        assert!(TransitionType::Both.applies_to(Direction::Exit));
        assert!(TransitionType::Enter.applies_to(Direction::Entry));
        assert!(!TransitionType::Enter.applies_to(Direction::Exit));
        assert!(!TransitionType::Exit.applies_to(Direction::Entry));
    }

    #[test]
    fn test_preferences_merge_partial_record() {
        let patch: PreferencePatch = serde_json::from_str(r#"{"volume":"30","muted":true}"#).unwrap();
        let prefs = UserPreferences::with_volume(70).merged_with(&patch);
        assert_eq!(prefs.volume, 30);
        assert!(prefs.muted);
        assert!(!prefs.disabled);
        assert_eq!(prefs.consent, Consent::Unset);
    }

    #[test]
    fn test_preferences_defaults() {
        let prefs = UserPreferences::default();
        assert_eq!(prefs.volume, 50);
        assert!(!prefs.muted);
        assert_eq!(prefs.consent, Consent::Unset);
    }
}
