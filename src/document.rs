//! Reading untyped store documents into typed records.
//!
//! Documents written by older clients are loosely typed: quantities show up as
//! numbers or as free text, optional fields may be missing or `null`. Every
//! helper here applies one defaulting rule so record parsers never have to.

use chrono::{DateTime, NaiveDate, Utc};
use regex_lite::Regex;
use serde_json::{Map, Value};
use static_init::dynamic;

use crate::errors::DocumentParseError;

pub type Document = Map<String, Value>;

/// Typed records stored as documents.
pub trait FromDocument: Sized {
    fn from_document(id: &str, doc: &Value) -> Result<Self, DocumentParseError>;
}

pub trait ToDocument {
    fn to_document(&self) -> Value;
}

pub fn as_object<'a>(id: &str, doc: &'a Value) -> Result<&'a Document, DocumentParseError> {
    doc.as_object()
        .ok_or_else(|| DocumentParseError::NotAnObject(id.to_string()))
}

/// Leading decimal number of `raw`, like a lenient float parse: `"2kg"` is 2,
/// `"abc"` is 0. Negative and non-finite values read as 0.
pub fn parse_quantity(raw: &str) -> f64 {
    #[dynamic]
    static RE: Regex = Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").unwrap();

    RE.find(raw)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
        .map(sanitize_quantity)
        .unwrap_or(0.0)
}

fn sanitize_quantity(q: f64) -> f64 {
    if q.is_finite() && q > 0.0 {
        q
    } else {
        0.0
    }
}

pub fn quantity_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(sanitize_quantity).unwrap_or(0.0),
        Some(Value::String(s)) => parse_quantity(s),
        _ => 0.0,
    }
}

pub fn quantity_field(doc: &Document, key: &str) -> f64 {
    quantity_value(doc.get(key))
}

/// Text of a field; numbers are stringified, anything else is empty.
pub fn string_field(doc: &Document, key: &str) -> String {
    match doc.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Like [`string_field`], but blank values become `None`.
pub fn opt_string_field(doc: &Document, key: &str) -> Option<String> {
    let s = string_field(doc, key);
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn required_string_field(
    id: &str,
    doc: &Document,
    key: &'static str,
) -> Result<String, DocumentParseError> {
    opt_string_field(doc, key).ok_or_else(|| DocumentParseError::MissingField {
        id: id.to_string(),
        field: key,
    })
}

pub fn bool_field(doc: &Document, key: &str) -> bool {
    matches!(doc.get(key), Some(Value::Bool(true)))
}

pub fn string_list_field(doc: &Document, key: &str) -> Vec<String> {
    match doc.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

pub fn date_field(doc: &Document, key: &str) -> Option<NaiveDate> {
    let raw = doc.get(key)?.as_str()?;
    parse_date_key(raw).or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.date_naive())
    })
}

pub fn timestamp_field(doc: &Document, key: &str) -> Option<DateTime<Utc>> {
    let raw = doc.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_date_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
