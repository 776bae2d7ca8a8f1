//! Change records produced by the constraint engine.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::description::ApiEntry;

/// Ordinal breaking severity. `Unknown` sorts below everything else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BreakingRank {
    #[default]
    Unknown,
    Compatible,
    Low,
    Medium,
    High,
}

impl BreakingRank {
    /// All ranks from most to least severe.
    pub const DESCENDING: [BreakingRank; 5] = [
        BreakingRank::High,
        BreakingRank::Medium,
        BreakingRank::Low,
        BreakingRank::Compatible,
        BreakingRank::Unknown,
    ];

    pub fn value(&self) -> i32 {
        match self {
            BreakingRank::Unknown => -1,
            BreakingRank::Compatible => 0,
            BreakingRank::Low => 30,
            BreakingRank::Medium => 60,
            BreakingRank::High => 100,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            -1 => Some(BreakingRank::Unknown),
            0 => Some(BreakingRank::Compatible),
            30 => Some(BreakingRank::Low),
            60 => Some(BreakingRank::Medium),
            100 => Some(BreakingRank::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakingRank::Unknown => "Unknown",
            BreakingRank::Compatible => "Compatible",
            BreakingRank::Low => "Low",
            BreakingRank::Medium => "Medium",
            BreakingRank::High => "High",
        }
    }

    /// Whether the rank counts as a breaking change (Low or above).
    pub fn is_breaking(&self) -> bool {
        *self >= BreakingRank::Low
    }
}

impl std::fmt::Display for BreakingRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BreakingRank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

impl<'de> Deserialize<'de> for BreakingRank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        BreakingRank::from_value(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid breaking rank {}", value)))
    }
}

/// Outcome of trigger verification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VerifyState {
    #[default]
    Unknown,
    Fail,
    Pass,
}

impl VerifyState {
    pub fn value(&self) -> i32 {
        match self {
            VerifyState::Unknown => 0,
            VerifyState::Fail => 50,
            VerifyState::Pass => 100,
        }
    }
}

impl Serialize for VerifyState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

impl<'de> Deserialize<'de> for VerifyState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i32::deserialize(deserializer)? {
            0 => Ok(VerifyState::Unknown),
            50 => Ok(VerifyState::Fail),
            100 => Ok(VerifyState::Pass),
            other => Err(serde::de::Error::custom(format!(
                "invalid verify state {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyData {
    pub state: VerifyState,
    pub message: String,
    pub verifier: String,
}

/// A single tagged change between two entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffEntry {
    pub id: String,
    pub kind: String,
    pub rank: BreakingRank,
    pub verify: VerifyData,
    pub message: String,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<ApiEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<ApiEntry>,
}

impl DiffEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach `data`; non-object values are ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data.extend(map);
        }
        self
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    /// Whether every present snapshot is private.
    pub fn is_private_only(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(a), Some(b)) => a.is_private() && b.is_private(),
            (Some(a), None) => a.is_private(),
            (None, Some(b)) => b.is_private(),
            (None, None) => false,
        }
    }
}
