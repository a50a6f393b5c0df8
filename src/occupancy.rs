//! Inpatient bed occupancy.
//!
//! A bed is either free or held by exactly one patient (see
//! [`Occupancy`]). Every state change is a read-modify-write inside an
//! immediate transaction, so two requests touching the same bed apply one
//! after the other.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{begin_immediate, repository, DatabaseError};
use crate::error::ServiceError;
use crate::models::*;

const DUPLICATE_BED: &str = "This bed already exists";

/// Partial bed update.
///
/// `patient` distinguishes an absent field (`None`) from an explicit
/// `null` (`Some(None)`), which releases the bed.
#[derive(Debug, Clone, Default)]
pub struct BedPatch {
    pub ward: Option<String>,
    pub room_number: Option<String>,
    pub bed_number: Option<String>,
    pub is_available: Option<bool>,
    pub patient: Option<Option<Uuid>>,
    pub admitted_at: Option<DateTime<Utc>>,
    pub discharged_at: Option<DateTime<Utc>>,
}

impl BedPatch {
    pub fn is_empty(&self) -> bool {
        self.ward.is_none()
            && self.room_number.is_none()
            && self.bed_number.is_none()
            && self.is_available.is_none()
            && self.patient.is_none()
            && self.admitted_at.is_none()
            && self.discharged_at.is_none()
    }
}

fn required(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn occupy(bed: &Bed, patient: Uuid, admitted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Occupancy {
    // Reassigning keeps the original admission unless the caller gives one.
    let admitted_at = admitted_at
        .or_else(|| bed.occupancy.admitted_at())
        .unwrap_or(now);
    Occupancy::Occupied {
        patient,
        admitted_at,
    }
}

fn load_bed(conn: &Connection, id: &Uuid) -> Result<Bed, ServiceError> {
    repository::get_bed(conn, id)?.ok_or_else(|| ServiceError::not_found("Room", id))
}

fn ensure_patient(conn: &Connection, id: &Uuid) -> Result<(), ServiceError> {
    if repository::patient_exists(conn, id)? {
        Ok(())
    } else {
        Err(ServiceError::not_found("Patient", id))
    }
}

fn store(conn: &Connection, bed: &Bed) -> Result<(), ServiceError> {
    let written = repository::write_bed(conn, bed).map_err(|e| match e {
        DatabaseError::ForeignKeyViolation(_) => {
            ServiceError::not_found("Patient", bed.occupancy.patient().unwrap_or_default())
        }
        other => ServiceError::from_write(other, DUPLICATE_BED),
    })?;
    if !written {
        return Err(ServiceError::not_found("Room", bed.id));
    }
    Ok(())
}

/// Register a new, free bed.
pub fn create_bed(conn: &Connection, clock: &dyn Clock, request: NewBed) -> Result<Bed, ServiceError> {
    let ward = required("ward", &request.ward)?;
    let room_number = required("roomNumber", &request.room_number)?;
    let bed_number = required("bedNumber", &request.bed_number)?;

    let now = clock.now();
    let bed = Bed {
        id: Uuid::new_v4(),
        ward,
        room_number,
        bed_number,
        occupancy: Occupancy::Free { discharged_at: None },
        created_at: now,
        updated_at: now,
    };
    repository::insert_bed(conn, &bed).map_err(|e| ServiceError::from_write(e, DUPLICATE_BED))?;

    tracing::info!(bed_id = %bed.id, ward = %bed.ward, room = %bed.room_number, bed = %bed.bed_number, "bed created");
    Ok(bed)
}

pub fn get_bed(conn: &Connection, id: &Uuid) -> Result<BedRecord<Patient>, ServiceError> {
    repository::get_bed_detail(conn, id)?.ok_or_else(|| ServiceError::not_found("Room", id))
}

pub fn list_beds(
    conn: &Connection,
    filter: &BedFilter,
    page: PageRequest,
) -> Result<Page<BedRecord<Patient>>, ServiceError> {
    Ok(repository::list_beds(conn, filter, page)?)
}

/// Put a patient in a bed. `admitted_at` defaults to now.
pub fn assign_patient(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
    patient: Uuid,
    admitted_at: Option<DateTime<Utc>>,
) -> Result<Bed, ServiceError> {
    let tx = begin_immediate(conn)?;
    let mut bed = load_bed(&tx, id)?;
    ensure_patient(&tx, &patient)?;

    let now = clock.now();
    bed.occupancy = occupy(&bed, patient, admitted_at, now);
    bed.updated_at = now;
    store(&tx, &bed)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(bed_id = %bed.id, patient_id = %patient, "patient admitted");
    Ok(bed)
}

/// Free a bed and record when. `discharged_at` defaults to now.
pub fn discharge(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
    discharged_at: Option<DateTime<Utc>>,
) -> Result<Bed, ServiceError> {
    let tx = begin_immediate(conn)?;
    let mut bed = load_bed(&tx, id)?;

    let now = clock.now();
    bed.occupancy = Occupancy::Free {
        discharged_at: Some(discharged_at.unwrap_or(now)),
    };
    bed.updated_at = now;
    store(&tx, &bed)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(bed_id = %bed.id, "patient discharged");
    Ok(bed)
}

/// Apply a partial update.
///
/// Assignment effects (`patient`, `isAvailable`, `admittedAt`) apply
/// first and discharge effects (`dischargedAt`) second, so a patch
/// carrying both always leaves the bed free.
pub fn update_bed(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
    patch: BedPatch,
) -> Result<Bed, ServiceError> {
    if patch.is_empty() {
        return Err(ServiceError::invalid("No valid fields provided for update"));
    }

    let tx = begin_immediate(conn)?;
    let mut bed = load_bed(&tx, id)?;
    let now = clock.now();

    if let Some(ward) = &patch.ward {
        bed.ward = required("ward", ward)?;
    }
    if let Some(room) = &patch.room_number {
        bed.room_number = required("roomNumber", room)?;
    }
    if let Some(number) = &patch.bed_number {
        bed.bed_number = required("bedNumber", number)?;
    }

    match (patch.patient, patch.is_available) {
        (Some(Some(_)), Some(true)) => {
            return Err(ServiceError::invalid(
                "isAvailable cannot be true while assigning a patient",
            ));
        }
        (Some(None), Some(false)) => {
            return Err(ServiceError::invalid(
                "isAvailable cannot be false without a patient",
            ));
        }
        (Some(Some(patient)), _) => {
            ensure_patient(&tx, &patient)?;
            bed.occupancy = occupy(&bed, patient, patch.admitted_at, now);
        }
        (Some(None), _) | (None, Some(true)) => {
            if !bed.occupancy.is_available() {
                bed.occupancy = Occupancy::Free { discharged_at: None };
            }
        }
        (None, Some(false)) if bed.occupancy.is_available() => {
            return Err(ServiceError::invalid(
                "isAvailable cannot be false without a patient",
            ));
        }
        (None, _) => {
            if let (Some(admitted_at), Occupancy::Occupied { patient, .. }) =
                (patch.admitted_at, &bed.occupancy)
            {
                bed.occupancy = Occupancy::Occupied {
                    patient: *patient,
                    admitted_at,
                };
            }
        }
    }

    if let Some(discharged_at) = patch.discharged_at {
        bed.occupancy = Occupancy::Free {
            discharged_at: Some(discharged_at),
        };
    } else if patch.admitted_at.is_some() && bed.occupancy.is_available() {
        return Err(ServiceError::invalid("admittedAt requires an occupied bed"));
    }

    bed.updated_at = now;
    store(&tx, &bed)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        bed_id = %bed.id,
        available = bed.occupancy.is_available(),
        "bed updated"
    );
    Ok(bed)
}

/// Remove a bed, returning what was removed.
pub fn delete_bed(conn: &Connection, id: &Uuid) -> Result<Bed, ServiceError> {
    let removed = repository::delete_bed(conn, id)?.ok_or_else(|| ServiceError::not_found("Room", id))?;
    tracing::info!(bed_id = %removed.id, "bed deleted");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::repository::insert_patient;
    use crate::db::sqlite::open_memory_database;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    fn clock() -> FixedClock {
        FixedClock(at(12))
    }

    fn setup() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Sabbir".into(),
            phone: Some("01544444444".into()),
            email: None,
        };
        insert_patient(&conn, &patient, &at(0)).unwrap();
        (conn, patient.id)
    }

    fn new_bed(ward: &str, room: &str, bed: &str) -> NewBed {
        NewBed {
            ward: ward.into(),
            room_number: room.into(),
            bed_number: bed.into(),
        }
    }

    #[test]
    fn create_trims_and_starts_free() {
        let (conn, _) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("  A ", "1", " 1")).unwrap();
        assert_eq!(bed.ward, "A");
        assert_eq!(bed.bed_number, "1");
        assert_eq!(bed.occupancy, Occupancy::Free { discharged_at: None });
    }

    #[test]
    fn duplicate_triple_conflicts() {
        let (conn, _) = setup();
        create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        let err = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg == DUPLICATE_BED));
    }

    #[test]
    fn blank_field_is_invalid() {
        let (conn, _) = setup();
        let err = create_bed(&conn, &clock(), new_bed("A", "   ", "1")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(msg) if msg.contains("roomNumber")));
    }

    #[test]
    fn assign_then_discharge() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();

        let taken = assign_patient(&conn, &clock(), &bed.id, patient, None).unwrap();
        assert!(!taken.occupancy.is_available());
        assert_eq!(taken.occupancy.patient(), Some(patient));
        assert_eq!(taken.occupancy.admitted_at(), Some(at(12)));

        let freed = discharge(&conn, &clock(), &bed.id, Some(at(18))).unwrap();
        assert!(freed.occupancy.is_available());
        assert_eq!(freed.occupancy.patient(), None);
        assert_eq!(freed.occupancy.admitted_at(), None);
        assert_eq!(freed.occupancy.discharged_at(), Some(at(18)));
    }

    #[test]
    fn assigning_clears_previous_discharge() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        discharge(&conn, &clock(), &bed.id, None).unwrap();
        let taken = assign_patient(&conn, &clock(), &bed.id, patient, Some(at(9))).unwrap();
        assert_eq!(taken.occupancy.discharged_at(), None);
        assert_eq!(taken.occupancy.admitted_at(), Some(at(9)));
    }

    #[test]
    fn assign_unknown_patient_or_bed_is_not_found() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        assert!(matches!(
            assign_patient(&conn, &clock(), &bed.id, Uuid::new_v4(), None),
            Err(ServiceError::NotFound { entity: "Patient", .. })
        ));
        assert!(matches!(
            assign_patient(&conn, &clock(), &Uuid::new_v4(), patient, None),
            Err(ServiceError::NotFound { entity: "Room", .. })
        ));
    }

    #[test]
    fn update_with_patient_and_discharge_ends_free() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        let patch = BedPatch {
            patient: Some(Some(patient)),
            discharged_at: Some(at(15)),
            ..Default::default()
        };
        let updated = update_bed(&conn, &clock(), &bed.id, patch).unwrap();
        assert!(updated.occupancy.is_available());
        assert_eq!(updated.occupancy.patient(), None);
        assert_eq!(updated.occupancy.discharged_at(), Some(at(15)));
    }

    #[test]
    fn update_null_patient_releases_without_discharge_time() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        assign_patient(&conn, &clock(), &bed.id, patient, None).unwrap();

        let patch = BedPatch {
            patient: Some(None),
            ..Default::default()
        };
        let updated = update_bed(&conn, &clock(), &bed.id, patch).unwrap();
        assert_eq!(updated.occupancy, Occupancy::Free { discharged_at: None });
    }

    #[test]
    fn update_available_true_releases() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        assign_patient(&conn, &clock(), &bed.id, patient, None).unwrap();
        let patch = BedPatch {
            is_available: Some(true),
            ..Default::default()
        };
        assert!(update_bed(&conn, &clock(), &bed.id, patch)
            .unwrap()
            .occupancy
            .is_available());
    }

    #[test]
    fn unavailable_without_patient_is_invalid() {
        let (conn, _) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        let patch = BedPatch {
            is_available: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            update_bed(&conn, &clock(), &bed.id, patch),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn admitted_at_on_free_bed_is_invalid() {
        let (conn, _) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        let patch = BedPatch {
            admitted_at: Some(at(9)),
            ..Default::default()
        };
        assert!(matches!(
            update_bed(&conn, &clock(), &bed.id, patch),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn rename_onto_existing_triple_conflicts_and_keeps_state() {
        let (conn, _) = setup();
        create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        let second = create_bed(&conn, &clock(), new_bed("A", "1", "2")).unwrap();
        let patch = BedPatch {
            bed_number: Some("1".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_bed(&conn, &clock(), &second.id, patch),
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(get_bed(&conn, &second.id).unwrap().bed_number, "2");
    }

    #[test]
    fn empty_patch_is_invalid_and_unknown_bed_not_found() {
        let (conn, _) = setup();
        assert!(matches!(
            update_bed(&conn, &clock(), &Uuid::new_v4(), BedPatch::default()),
            Err(ServiceError::InvalidInput(_))
        ));
        let patch = BedPatch {
            ward: Some("B".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_bed(&conn, &clock(), &Uuid::new_v4(), patch),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn get_expands_patient() {
        let (conn, patient) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        assign_patient(&conn, &clock(), &bed.id, patient, None).unwrap();
        let record = get_bed(&conn, &bed.id).unwrap();
        assert_eq!(record.patient.map(|p| p.name), Some("Sabbir".to_string()));
    }

    #[test]
    fn delete_then_not_found() {
        let (conn, _) = setup();
        let bed = create_bed(&conn, &clock(), new_bed("A", "1", "1")).unwrap();
        assert_eq!(delete_bed(&conn, &bed.id).unwrap().id, bed.id);
        assert!(matches!(delete_bed(&conn, &bed.id), Err(ServiceError::NotFound { .. })));
    }
}
