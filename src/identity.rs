//! # Action Identity
//!
//! Time-ordered, human-decodable identifiers of the form `<epoch_millis>_<uuid>`.
//! The millisecond prefix makes ids sort by creation time and lets an operator
//! read the creation instant straight off an audit record.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Identifier for an action and its audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId {
    millis: i64,
    uuid: Uuid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed action id '{value}': {reason}")]
pub struct IdentityError {
    pub value: String,
    pub reason: String,
}

impl ActionId {
    pub fn new() -> Self {
        Self::from_parts(Utc::now().timestamp_millis(), Uuid::new_v4())
    }

    pub fn from_parts(millis: i64, uuid: Uuid) -> Self {
        Self { millis, uuid }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Creation instant encoded in the id
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.millis, self.uuid)
    }
}

impl FromStr for ActionId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| IdentityError {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (millis, uuid) = s
            .split_once('_')
            .ok_or_else(|| malformed("expected <millis>_<uuid>"))?;
        let millis = millis
            .parse::<i64>()
            .map_err(|_| malformed("timestamp prefix is not an integer"))?;
        let uuid = Uuid::parse_str(uuid).map_err(|_| malformed("suffix is not a uuid"))?;

        Ok(Self::from_parts(millis, uuid))
    }
}

impl Serialize for ActionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
