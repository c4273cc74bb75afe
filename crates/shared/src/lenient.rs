//! Tolerant field decoders for rule feeds.
//!
//! The admin layer serialises database rows verbatim, so numbers and flags
//! routinely arrive as strings (`"80"`, `"1"`) and ids may be either.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// A string, or a number rendered as a string.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

/// Like [`string`], but empty and null become `None`.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = string(deserializer)?;
    let trimmed = s.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn number(value: Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("unrepresentable number {n}")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("`{s}` is not a number")),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        other => Err(format!("expected number, got {other}")),
    }
}

/// A percentage, clamped into `0..=100`.
pub fn percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let n = number(Value::deserialize(deserializer)?).map_err(de::Error::custom)?;
    Ok(n.round().clamp(0.0, 100.0) as u8)
}

/// Like [`percent`], but null or absent becomes `None`.
pub fn opt_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => {
            let n = number(value).map_err(de::Error::custom)?;
            Ok(Some(n.round().clamp(0.0, 100.0) as u8))
        }
    }
}

/// A non-negative millisecond count; negatives collapse to zero.
pub fn millis<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = number(Value::deserialize(deserializer)?).map_err(de::Error::custom)?;
    Ok(n.round().clamp(0.0, u32::MAX as f64) as u32)
}

/// A signed integer such as a rule priority.
pub fn int<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = number(Value::deserialize(deserializer)?).map_err(de::Error::custom)?;
    Ok(n.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}

/// A flag given as a bool, `0`/`1`, or `"true"`/`"false"`/`"1"`/`"0"`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => Err(de::Error::custom(format!("`{other}` is not a flag"))),
        },
        Value::Null => Ok(false),
        other => Err(de::Error::custom(format!("expected flag, got {other}"))),
    }
}

/// A list of raw rows. PHP renders arrays with gaps as objects, and an absent
/// list as `null`.
pub fn rows<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(_, row)| row).collect()),
        other => Err(de::Error::custom(format!("expected a list of rows, got {other}"))),
    }
}

/// Drop `null` members so that the field defaults apply.
pub fn without_nulls(row: Value) -> Value {
    match row {
        Value::Object(mut map) => {
            map.retain(|_, v| !v.is_null());
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "string")]
        id: String,
        #[serde(deserialize_with = "percent")]
        volume: u8,
        #[serde(deserialize_with = "millis")]
        delay: u32,
        #[serde(deserialize_with = "int")]
        priority: i32,
        #[serde(deserialize_with = "flag")]
        visual: bool,
        #[serde(default, deserialize_with = "opt_string")]
        url: Option<String>,
    }

    #[test]
    fn test_database_row_strings() {
        let row: Row = serde_json::from_str(
            r#"{"id":"12","volume":"80","delay":"250","priority":"-3","visual":"1","url":""}"#,
        )
        .unwrap();
        assert_eq!(row.id, "12");
        assert_eq!(row.volume, 80);
        assert_eq!(row.delay, 250);
        assert_eq!(row.priority, -3);
        assert!(row.visual);
        assert_eq!(row.url, None);
    }

    #[test]
    fn test_native_json_values_and_clamping() {
        let row: Row = serde_json::from_str(
            r#"{"id":7,"volume":150,"delay":-20,"priority":90,"visual":false,"url":"/a.mp3"}"#,
        )
        .unwrap();
        assert_eq!(row.id, "7");
        assert_eq!(row.volume, 100);
        assert_eq!(row.delay, 0);
        assert_eq!(row.priority, 90);
        assert!(!row.visual);
        assert_eq!(row.url.as_deref(), Some("/a.mp3"));
    }

    #[test]
    fn test_rows_accept_php_shapes() {
        #[derive(Deserialize)]
        struct Feed {
            #[serde(default, deserialize_with = "rows")]
            items: Vec<Value>,
        }
        let list: Feed = serde_json::from_str(r#"{"items":[{"id":1},{"id":2}]}"#).unwrap();
        assert_eq!(list.items.len(), 2);
        let keyed: Feed = serde_json::from_str(r#"{"items":{"0":{"id":1},"3":{"id":2}}}"#).unwrap();
        assert_eq!(keyed.items.len(), 2);
        let null: Feed = serde_json::from_str(r#"{"items":null}"#).unwrap();
        assert!(null.items.is_empty());
        assert!(serde_json::from_str::<Feed>(r#"{"items":5}"#).is_err());
    }

    #[test]
    fn test_null_members_fall_back_to_defaults() {
        #[derive(Deserialize)]
        struct Patch {
            #[serde(default = "full", deserialize_with = "percent")]
            volume: u8,
            #[serde(default, deserialize_with = "opt_percent")]
            saved: Option<u8>,
        }
        fn full() -> u8 {
            100
        }
        let row = without_nulls(serde_json::json!({"volume": null, "saved": null}));
        let patch: Patch = serde_json::from_value(row).unwrap();
        assert_eq!(patch.volume, 100);
        assert_eq!(patch.saved, None);

        let patch: Patch = serde_json::from_str(r#"{"volume":"40","saved":null}"#).unwrap();
        assert_eq!(patch.volume, 40);
        assert_eq!(patch.saved, None);
    }

    #[test]
    fn test_garbage_number_is_an_error() {
        let result = serde_json::from_str::<Row>(
            r#"{"id":1,"volume":"loud","delay":0,"priority":0,"visual":true}"#,
        );
        assert!(result.is_err());
    }
}
