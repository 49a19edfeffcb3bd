//! Content fingerprints over canonical JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Serializes JSON with object keys sorted and no whitespace.
///
/// Two values that differ only in key order produce the same string.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let items: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

/// A hex-encoded SHA-256 digest identifying an invocation or a value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Hashes the canonical form of a JSON value.
    #[must_use]
    pub fn of_json(value: &Value) -> Self {
        Self::of_bytes(canonical_json(value).as_bytes())
    }

    /// Hashes any serializable value through its canonical JSON form.
    pub fn of_value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::of_json(&serde_json::to_value(value)?))
    }

    /// Fingerprint of one output slot of the invocation identified by `self`.
    #[must_use]
    pub fn derive(&self, slot: &str) -> Self {
        Self::of_bytes(format!("{}/{}", self.0, slot).as_bytes())
    }

    /// Parses a 64-character lowercase hex digest.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    /// The full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first 12 hex characters, for logs.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that determines a step's outputs.
///
/// Equal invocations always yield equal fingerprints; any change to the
/// behaviour version, the configuration or an upstream fingerprint yields a
/// new one.
#[derive(Debug, Clone, Serialize)]
pub struct StepInvocation<'a> {
    /// Node name.
    pub step: &'a str,
    /// Behaviour name.
    pub behaviour: &'a str,
    /// Behaviour version.
    pub behaviour_version: u32,
    /// Node configuration.
    pub config: &'a Value,
    /// Fingerprint of each resolved input slot.
    pub inputs: BTreeMap<String, Fingerprint>,
}

impl StepInvocation<'_> {
    /// Computes the invocation fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let inputs: serde_json::Map<String, Value> = self
            .inputs
            .iter()
            .map(|(slot, fp)| (slot.clone(), Value::String(fp.0.clone())))
            .collect();
        Fingerprint::of_json(&serde_json::json!({
            "step": self.step,
            "behaviour": self.behaviour,
            "behaviour_version": self.behaviour_version,
            "config": self.config,
            "inputs": inputs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation<'a>(config: &'a Value, input: &str) -> StepInvocation<'a> {
        StepInvocation {
            step: "train",
            behaviour: "train_model",
            behaviour_version: 1,
            config,
            inputs: BTreeMap::from([("train".to_string(), Fingerprint::of_bytes(input.as_bytes()))]),
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"z": [{"y": "yes"}, null], "a": {"x": 10}});
        assert_eq!(canonical_json(&value), r#"{"a":{"x":10},"z":[{"y":"yes"},null]}"#);
    }

    #[test]
    fn test_key_order_does_not_change_fingerprint() {
        let a: Value = serde_json::from_str(r#"{"alpha": 1, "beta": {"x": 1, "y": 2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"beta": {"y": 2, "x": 1}, "alpha": 1}"#).unwrap();
        assert_eq!(Fingerprint::of_json(&a), Fingerprint::of_json(&b));
    }

    #[test]
    fn test_invocation_fingerprint_sensitivity() {
        let config = json!({"alpha": 1.0});
        let base = invocation(&config, "upstream").fingerprint();
        assert_eq!(base, invocation(&config, "upstream").fingerprint());

        let other_config = json!({"alpha": 2.0});
        assert_ne!(base, invocation(&other_config, "upstream").fingerprint());
        assert_ne!(base, invocation(&config, "changed").fingerprint());

        let mut bumped = invocation(&config, "upstream");
        bumped.behaviour_version = 2;
        assert_ne!(base, bumped.fingerprint());
    }

    #[test]
    fn test_derive_and_parse() {
        let fp = Fingerprint::of_bytes(b"x");
        assert_eq!(fp.as_str().len(), 64);
        assert_ne!(fp.derive("train"), fp.derive("test"));
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp.clone()));
        assert_eq!(Fingerprint::parse("not-hex"), None);
        assert_eq!(fp.short().len(), 12);
    }
}
