//! Drill event record
//!
//! Field names are the column names of the target table, so a record
//! serializes directly to one `JSONEachRow` line.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One synthesized drill event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Application id
    pub a: String,
    /// Event key
    pub e: &'static str,
    /// Bucketed user id
    pub uid: u64,
    /// Device id
    pub did: uuid::Uuid,
    /// Last session id (same as `_id`)
    pub lsid: String,
    #[serde(rename = "_id")]
    pub id: String,
    /// Event time, epoch milliseconds
    pub ts: i64,
    pub up: UserProfile,
    pub custom: CustomProperty,
    pub cmp: Campaign,
    pub sg: SessionGroup,
    /// Event count
    pub c: u32,
    /// Event sum
    pub s: f64,
    /// Event duration
    pub dur: u32,
}

/// User profile snapshot attached to every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// First seen, epoch seconds
    pub fs: i64,
    /// Last seen, epoch seconds
    pub ls: i64,
    /// Session count
    pub sc: u8,
    /// Device platform
    pub d: &'static str,
    pub cty: &'static str,
    pub rgn: &'static str,
    pub cc: &'static str,
    /// OS name
    pub p: &'static str,
    /// OS version, `o{major}:{minor}`
    pub pv: String,
    /// App version, `{major}:{minor}:{patch}`
    pub av: String,
    /// Carrier
    pub c: &'static str,
    /// Screen resolution
    pub r: &'static str,
    pub brw: &'static str,
    /// Browser version, `[{browser}]_{major}:0:0:0`
    pub brwv: String,
    pub la: &'static str,
    pub src: &'static str,
    pub src_ch: &'static str,
    /// Last view
    pub lv: &'static str,
    pub hour: u8,
    pub dow: u8,
}

/// A single customer property, serialized as a one-entry object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomProperty {
    pub key: &'static str,
    pub value: &'static str,
}

impl Serialize for CustomProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.key, self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Campaign {
    /// Channel
    pub c: &'static str,
}

/// Segmentation map: random `k####` keys plus fixed metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGroup {
    pub entries: Vec<(&'static str, &'static str)>,
    pub request_id: String,
    pub postfix: &'static str,
    pub ended: bool,
}

impl SessionGroup {
    /// Number of keys in the serialized object
    pub fn key_count(&self) -> usize {
        self.entries.len() + 3
    }
}

impl Serialize for SessionGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.key_count()))?;
        for (key, word) in &self.entries {
            map.serialize_entry(key, word)?;
        }
        map.serialize_entry("request_id", &self.request_id)?;
        map.serialize_entry("postfix", self.postfix)?;
        map.serialize_entry("ended", if self.ended { "true" } else { "false" })?;
        map.end()
    }
}
