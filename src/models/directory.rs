//! Patient and doctor records owned by the catalog collaborator. The core
//! only checks existence and embeds them in listings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// One weekly window a doctor declares as working time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindow {
    pub day: String,
    pub from_hour: u8,
    pub from_minute: u8,
    pub to_hour: u8,
    pub to_minute: u8,
}

/// Doctor directory entry.
///
/// `availability` and `off_dates` are carried for the catalog but are not
/// consulted by slot computation or conflict checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
    #[serde(default)]
    pub off_dates: Vec<NaiveDate>,
}
