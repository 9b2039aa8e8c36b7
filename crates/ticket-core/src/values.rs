use chrono::{DateTime, FixedOffset};
use serde_json::Value;

const DATE_FIELDS: &[&str] = &["begin", "due", "deadline"];
const OBJECT_TEXT_KEYS: &[&str] = &["text", "name", "en_name", "value"];
const MILLIS_THRESHOLD: i64 = 10_000_000_000;
// Bitable date cells are midnight China Standard Time.
const DATE_UTC_OFFSET_SECONDS: i32 = 8 * 3600;

pub fn is_date_field(field: &str) -> bool {
    DATE_FIELDS.contains(&field)
}

pub fn clean_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) => {
            let parts = items.iter().filter_map(clean_value).collect::<Vec<_>>();
            match parts.len() {
                0 => None,
                1 => parts.into_iter().next(),
                _ => Some(parts.join("|")),
            }
        }
        Value::Object(object) => OBJECT_TEXT_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(clean_value))
            .or_else(|| serde_json::to_string(value).ok()),
    }
}

pub fn clean_date_value(value: &Value) -> Option<String> {
    match epoch_millis(value).and_then(format_epoch_date) {
        Some(date) => Some(date),
        None => clean_value(value),
    }
}

fn epoch_millis(value: &Value) -> Option<i64> {
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().map(|number| number as i64))?;
    (millis > MILLIS_THRESHOLD).then_some(millis)
}

fn format_epoch_date(millis: i64) -> Option<String> {
    let offset = FixedOffset::east_opt(DATE_UTC_OFFSET_SECONDS)?;
    let datetime = DateTime::from_timestamp_millis(millis)?.with_timezone(&offset);
    Some(datetime.format("%Y-%m-%d").to_string())
}
