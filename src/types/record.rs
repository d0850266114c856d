use std::{fmt::Display, ops::Deref, str::FromStr};

use miette::{miette, Context, IntoDiagnostic};
use serde_json::{Map, Value};

use crate::result::Error;

/// One untyped key/value payload as emitted by the extraction tool for one
/// item (one JSON object per stdout line for batched queries).
///
/// Short-lived: consumed immediately by the metadata normalizer, which
/// degrades every malformed field to an absent value instead of failing.
#[derive(Debug, Clone)]
pub struct RawExtractionRecord(Map<String, Value>);

impl RawExtractionRecord {
    pub fn new(data: Map<String, Value>) -> Self {
        Self(data)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn array_field(&self, key: &str) -> Option<&Vec<Value>> {
        self.0.get(key).and_then(Value::as_array)
    }
}

impl FromStr for RawExtractionRecord {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let json = serde_json::from_str::<Value>(line)
            .into_diagnostic()
            .wrap_err("Could not parse extraction output line as JSON")?;

        match json {
            Value::Object(map) => Ok(Self(map)),
            other => Err(miette!("Extraction output line is not a JSON object: {other}").into()),
        }
    }
}

impl Deref for RawExtractionRecord {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for RawExtractionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{{")?;
        for (k, v) in self.0.iter() {
            writeln!(f, "\t{k}: {v}")?;
        }
        writeln!(f, "}}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_object_line() {
        let record: RawExtractionRecord =
            r#"{"id": "x1", "duration": 42, "is_live": false}"#.parse().unwrap();

        assert_eq!(record.str_field("id"), Some("x1"));
        assert_eq!(record.u64_field("duration"), Some(42));
        assert_eq!(record.bool_field("is_live"), Some(false));
        assert_eq!(record.str_field("missing"), None);
    }

    #[test]
    fn rejects_non_object_lines() {
        assert!("[1, 2, 3]".parse::<RawExtractionRecord>().is_err());
        assert!("not json".parse::<RawExtractionRecord>().is_err());
    }
}
