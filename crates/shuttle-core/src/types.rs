//! Data model shared by the session machine, the stores, and the backend client.

use std::collections::BTreeMap;
use std::fmt;

use getrandom::getrandom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::CivilTime;

/// Shuttle plate number. Partition key of sessions and checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    /// Surrounding whitespace is not part of a plate.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Plate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Route the shuttle runs for the whole session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub id: Option<i64>,
    pub origin: String,
    pub destination: String,
    /// Surcharge added to every passenger fare on this route.
    pub added_rate: Decimal,
}

/// A passenger category and its base fare.
///
/// On the wire this is one row of the fare-rate table:
/// `{"passenger_type": "Student", "passenger_rate": "8.00"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "passenger_type")]
    pub label: String,
    #[serde(rename = "passenger_rate")]
    pub base_rate: Decimal,
}

impl PassengerType {
    pub fn new(label: impl Into<String>, base_rate: Decimal) -> Self {
        Self {
            id: None,
            label: label.into(),
            base_rate,
        }
    }
}

/// One passenger recorded during a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogEntry {
    pub id: String,
    pub timestamp: CivilTime,
    pub passenger_type: String,
    /// `None` for passengers added manually by the inspector.
    pub tag_id: Option<String>,
}

impl ScanLogEntry {
    pub fn is_manual(&self) -> bool {
        self.tag_id.is_none()
    }
}

/// Generate a log entry id: 8 random bytes, hex encoded.
pub fn new_entry_id() -> String {
    let mut bytes = [0u8; 8];
    if getrandom(&mut bytes).is_err() {
        // Fall back to the clock; uniqueness only matters within one session.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        bytes = nanos.to_be_bytes();
    }
    hex::encode(bytes)
}

/// Log entry as submitted: the entry plus its computed fare and the plate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedLogEntry {
    #[serde(flatten)]
    pub entry: ScanLogEntry,
    pub fare: Decimal,
    pub plate: Plate,
}

/// Route snapshot carried by an inspection record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub origin: String,
    pub destination: String,
    pub added_rate: Decimal,
}

impl From<&Route> for RouteSnapshot {
    fn from(route: &Route) -> Self {
        Self {
            origin: route.origin.clone(),
            destination: route.destination.clone(),
            added_rate: route.added_rate,
        }
    }
}

/// Final payload of a session, built once at `end()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecord {
    #[serde(rename = "inspectionId", default, skip_serializing_if = "Option::is_none")]
    pub inspection_id: Option<String>,
    pub driver: String,
    pub plate: Plate,
    pub route: RouteSnapshot,
    #[serde(rename = "start_datetime")]
    pub start_time: CivilTime,
    #[serde(rename = "end_datetime")]
    pub end_time: CivilTime,
    pub total_passengers: usize,
    pub total_claimed_money: Decimal,
    #[serde(default)]
    pub logs: Vec<SubmittedLogEntry>,
    #[serde(rename = "passengerCounts", default)]
    pub passenger_counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub inspector: String,
    #[serde(rename = "currentFareRates", default)]
    pub current_fare_rates: Vec<PassengerType>,
}

/// Server acknowledgement of a submitted inspection.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SubmitReceipt {
    #[serde(rename = "inspectionId", deserialize_with = "id_as_string")]
    pub inspection_id: String,
}

/// A shuttle assignment as listed by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuttleAssignment {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(rename = "shuttleDriver")]
    pub driver: String,
    #[serde(rename = "shuttlePlatNumber")]
    pub plate: Plate,
    pub origin: String,
    pub destination: String,
    pub added_rate: Decimal,
    #[serde(default)]
    pub route_id: Option<i64>,
}

impl ShuttleAssignment {
    pub fn route(&self) -> Route {
        Route {
            id: self.route_id,
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            added_rate: self.added_rate,
        }
    }
}

/// One row of the inspection history listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionSummary {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub driver: String,
    pub plate: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    pub total_claimed_money: Decimal,
    pub start_datetime: String,
}

/// Backend ids arrive as numbers or strings depending on the endpoint.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(i64),
        Str(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Num(n) => n.to_string(),
        RawId::Str(s) => s,
    })
}
