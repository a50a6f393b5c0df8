use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;

/// A patient's reservation of a doctor at one instant.
///
/// `P` and `D` are the patient and doctor references: bare ids when stored,
/// directory records when expanded for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment<P = Uuid, D = Uuid> {
    pub id: Uuid,
    pub patient: P,
    pub doctor: D,
    pub datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<P, D> Appointment<P, D> {
    pub fn expand<P2, D2>(self, patient: P2, doctor: D2) -> Appointment<P2, D2> {
        Appointment {
            id: self.id,
            patient,
            doctor,
            datetime: self.datetime,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Minimal appointment reference embedded in invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    pub id: Uuid,
    pub datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl<P, D> From<&Appointment<P, D>> for AppointmentSummary {
    fn from(appt: &Appointment<P, D>) -> Self {
        Self {
            id: appt.id,
            datetime: appt.datetime,
            status: appt.status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub datetime: DateTime<Utc>,
}

/// Partial update of an appointment. At least one field must be set.
#[derive(Debug, Clone, Default)]
pub struct AppointmentChanges {
    pub datetime: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentChanges {
    pub fn is_empty(&self) -> bool {
        self.datetime.is_none() && self.status.is_none()
    }
}
