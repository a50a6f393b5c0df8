use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Whether a bed is held by a patient.
///
/// A free bed never has a patient or admission time; an occupied bed never
/// carries a discharge time.
#[derive(Debug, Clone, PartialEq)]
pub enum Occupancy {
    Free {
        discharged_at: Option<DateTime<Utc>>,
    },
    Occupied {
        patient: Uuid,
        admitted_at: DateTime<Utc>,
    },
}

impl Occupancy {
    pub fn is_available(&self) -> bool {
        matches!(self, Occupancy::Free { .. })
    }

    pub fn patient(&self) -> Option<Uuid> {
        match self {
            Occupancy::Occupied { patient, .. } => Some(*patient),
            Occupancy::Free { .. } => None,
        }
    }

    pub fn admitted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Occupancy::Occupied { admitted_at, .. } => Some(*admitted_at),
            Occupancy::Free { .. } => None,
        }
    }

    pub fn discharged_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Occupancy::Free { discharged_at } => *discharged_at,
            Occupancy::Occupied { .. } => None,
        }
    }
}

/// An inpatient bed, identified by its (ward, room, bed) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Bed {
    pub id: Uuid,
    pub ward: String,
    pub room_number: String,
    pub bed_number: String,
    pub occupancy: Occupancy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat wire form of a bed. `P` is the patient reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BedRecord<P = Uuid> {
    pub id: Uuid,
    pub ward: String,
    pub room_number: String,
    pub bed_number: String,
    pub is_available: bool,
    pub patient: Option<P>,
    pub admitted_at: Option<DateTime<Utc>>,
    pub discharged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bed {
    pub fn record(&self) -> BedRecord {
        self.record_with(self.occupancy.patient())
    }

    /// Wire form with the patient reference replaced by `patient`.
    pub fn record_with<P>(&self, patient: Option<P>) -> BedRecord<P> {
        BedRecord {
            id: self.id,
            ward: self.ward.clone(),
            room_number: self.room_number.clone(),
            bed_number: self.bed_number.clone(),
            is_available: self.occupancy.is_available(),
            patient,
            admitted_at: self.occupancy.admitted_at(),
            discharged_at: self.occupancy.discharged_at(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Serialize for Bed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record().serialize(serializer)
    }
}

#[derive(Debug, Clone)]
pub struct NewBed {
    pub ward: String,
    pub room_number: String,
    pub bed_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bed(occupancy: Occupancy) -> Bed {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        Bed {
            id: Uuid::new_v4(),
            ward: "A".into(),
            room_number: "1".into(),
            bed_number: "1".into(),
            occupancy,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn occupied_bed_serializes_unavailable_with_patient() {
        let patient = Uuid::new_v4();
        let admitted = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let json = serde_json::to_value(bed(Occupancy::Occupied {
            patient,
            admitted_at: admitted,
        }))
        .unwrap();

        assert_eq!(json["isAvailable"], false);
        assert_eq!(json["patient"], patient.to_string());
        assert_eq!(json["roomNumber"], "1");
        assert!(json["dischargedAt"].is_null());
    }

    #[test]
    fn free_bed_serializes_without_patient() {
        let json = serde_json::to_value(bed(Occupancy::Free { discharged_at: None })).unwrap();
        assert_eq!(json["isAvailable"], true);
        assert!(json["patient"].is_null());
        assert!(json["admittedAt"].is_null());
    }
}
