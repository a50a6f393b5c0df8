use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{repository, DatabaseError};
use crate::error::ServiceError;
use crate::models::*;

const DOUBLE_BOOKED: &str = "Doctor already has an appointment at this time";
const RESCHEDULE_CLASH: &str = "Doctor has another appointment at the new time";

/// Parse a caller-supplied instant.
///
/// RFC 3339 values keep their offset and are normalised to UTC; naive
/// `YYYY-MM-DDTHH:MM[:SS[.fff]]` values are read as UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ServiceError::invalid(format!("Invalid datetime: {raw:?}")))
}

/// Reserve a doctor for a patient at one instant.
pub fn create_appointment(
    conn: &Connection,
    clock: &dyn Clock,
    request: NewAppointment,
) -> Result<Appointment, ServiceError> {
    if !repository::patient_exists(conn, &request.patient_id)? {
        return Err(ServiceError::not_found("Patient", request.patient_id));
    }
    if !repository::doctor_exists(conn, &request.doctor_id)? {
        return Err(ServiceError::not_found("Doctor", request.doctor_id));
    }

    let now = clock.now();
    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient: request.patient_id,
        doctor: request.doctor_id,
        datetime: request.datetime,
        status: AppointmentStatus::Scheduled,
        created_at: now,
        updated_at: now,
    };

    repository::insert_appointment(conn, &appointment).map_err(|e| match e {
        // Patient or doctor removed since the existence check.
        DatabaseError::ForeignKeyViolation(_) => ServiceError::not_found(
            "Patient or doctor",
            format!("{}/{}", request.patient_id, request.doctor_id),
        ),
        other => ServiceError::from_write(other, DOUBLE_BOOKED),
    })?;

    tracing::info!(
        appointment_id = %appointment.id,
        doctor_id = %appointment.doctor,
        datetime = %appointment.datetime,
        "appointment scheduled"
    );
    Ok(appointment)
}

pub fn get_appointment(
    conn: &Connection,
    id: &Uuid,
) -> Result<Appointment<Patient, Doctor>, ServiceError> {
    repository::get_appointment_detail(conn, id)?
        .ok_or_else(|| ServiceError::not_found("Appointment", id))
}

/// Move an appointment and/or change its status.
///
/// Reviving a cancelled appointment into an instant its doctor already
/// holds is a conflict, like moving onto one.
pub fn reschedule_appointment(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
    changes: AppointmentChanges,
) -> Result<Appointment, ServiceError> {
    if changes.is_empty() {
        return Err(ServiceError::invalid(
            "At least one of datetime or status is required",
        ));
    }

    let updated = repository::update_appointment(conn, id, &changes, &clock.now())
        .map_err(|e| ServiceError::from_write(e, RESCHEDULE_CLASH))?
        .ok_or_else(|| ServiceError::not_found("Appointment", id))?;

    tracing::info!(
        appointment_id = %updated.id,
        status = %updated.status,
        datetime = %updated.datetime,
        "appointment updated"
    );
    Ok(updated)
}

/// Remove an appointment, returning what was removed.
pub fn delete_appointment(conn: &Connection, id: &Uuid) -> Result<Appointment, ServiceError> {
    let removed = repository::delete_appointment(conn, id)
        .map_err(|e| match e {
            DatabaseError::ForeignKeyViolation(_) => {
                ServiceError::Conflict("Appointment is referenced by an invoice".into())
            }
            other => ServiceError::Database(other),
        })?
        .ok_or_else(|| ServiceError::not_found("Appointment", id))?;

    tracing::info!(appointment_id = %removed.id, "appointment deleted");
    Ok(removed)
}

pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
    page: PageRequest,
) -> Result<Page<Appointment<Patient, Doctor>>, ServiceError> {
    Ok(repository::list_appointments(conn, filter, page)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::repository::{insert_doctor, insert_invoice, insert_patient};
    use crate::db::sqlite::open_memory_database;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn clock() -> FixedClock {
        FixedClock(at(8, 0))
    }

    struct Seeded {
        conn: Connection,
        patient: Uuid,
        doctor_x: Uuid,
        doctor_y: Uuid,
    }

    fn seeded() -> Seeded {
        let conn = open_memory_database().unwrap();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Farhana".into(),
            phone: Some("01933333333".into()),
            email: None,
        };
        insert_patient(&conn, &patient, &at(0, 0)).unwrap();
        let mut ids = Vec::new();
        for name in ["Dr. X", "Dr. Y"] {
            let doctor = Doctor {
                id: Uuid::new_v4(),
                name: name.into(),
                specialty: "Medicine".into(),
                availability: vec![],
                off_dates: vec![],
            };
            insert_doctor(&conn, &doctor, &at(0, 0)).unwrap();
            ids.push(doctor.id);
        }
        Seeded {
            conn,
            patient: patient.id,
            doctor_x: ids[0],
            doctor_y: ids[1],
        }
    }

    fn request(s: &Seeded, doctor: Uuid, when: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            patient_id: s.patient,
            doctor_id: doctor,
            datetime: when,
        }
    }

    #[test]
    fn parse_datetime_accepts_offsets_and_naive_utc() {
        assert_eq!(parse_datetime("2024-06-01T10:00:00Z").unwrap(), at(10, 0));
        assert_eq!(parse_datetime("2024-06-01T12:00:00+02:00").unwrap(), at(10, 0));
        assert_eq!(parse_datetime("2024-06-01T10:00:00.000").unwrap(), at(10, 0));
        assert_eq!(parse_datetime("2024-06-01T10:00").unwrap(), at(10, 0));
        assert!(matches!(
            parse_datetime("tomorrow at ten"),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn create_schedules_with_clock_timestamps() {
        let s = seeded();
        let appt = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.created_at, at(8, 0));
        assert_eq!(appt.updated_at, at(8, 0));
    }

    #[test]
    fn second_booking_of_same_doctor_and_instant_conflicts() {
        let s = seeded();
        create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        let err = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn same_instant_is_free_for_another_doctor() {
        let s = seeded();
        create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        create_appointment(&s.conn, &clock(), request(&s, s.doctor_y, at(10, 0))).unwrap();
    }

    #[test]
    fn offset_spelling_of_same_instant_still_conflicts() {
        let s = seeded();
        let first = parse_datetime("2024-06-01T10:00:00Z").unwrap();
        let second = parse_datetime("2024-06-01T16:00:00+06:00").unwrap();
        create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, first)).unwrap();
        let err = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, second)).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn unknown_patient_or_doctor_is_not_found() {
        let s = seeded();
        let mut req = request(&s, s.doctor_x, at(10, 0));
        req.patient_id = Uuid::new_v4();
        assert!(matches!(
            create_appointment(&s.conn, &clock(), req),
            Err(ServiceError::NotFound { entity: "Patient", .. })
        ));
        let req = request(&s, Uuid::new_v4(), at(10, 0));
        assert!(matches!(
            create_appointment(&s.conn, &clock(), req),
            Err(ServiceError::NotFound { entity: "Doctor", .. })
        ));
    }

    #[test]
    fn reschedule_onto_held_instant_conflicts() {
        let s = seeded();
        create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        let other = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(11, 0))).unwrap();

        let changes = AppointmentChanges {
            datetime: Some(at(10, 0)),
            ..Default::default()
        };
        let err = reschedule_appointment(&s.conn, &clock(), &other.id, changes).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg == RESCHEDULE_CLASH));
    }

    #[test]
    fn reschedule_to_own_instant_is_not_a_conflict() {
        let s = seeded();
        let appt = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        let changes = AppointmentChanges {
            datetime: Some(at(10, 0)),
            status: Some(AppointmentStatus::Completed),
        };
        let updated = reschedule_appointment(&s.conn, &clock(), &appt.id, changes).unwrap();
        assert_eq!(updated.status, AppointmentStatus::Completed);
    }

    #[test]
    fn cancelling_frees_the_instant_and_reviving_conflicts() {
        let s = seeded();
        let first = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        let cancel = AppointmentChanges {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        };
        reschedule_appointment(&s.conn, &clock(), &first.id, cancel).unwrap();

        create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();

        let revive = AppointmentChanges {
            status: Some(AppointmentStatus::Scheduled),
            ..Default::default()
        };
        let err = reschedule_appointment(&s.conn, &clock(), &first.id, revive).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn empty_changes_are_invalid_and_unknown_id_is_not_found() {
        let s = seeded();
        let err = reschedule_appointment(&s.conn, &clock(), &Uuid::new_v4(), AppointmentChanges::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let changes = AppointmentChanges {
            status: Some(AppointmentStatus::Completed),
            ..Default::default()
        };
        let err = reschedule_appointment(&s.conn, &clock(), &Uuid::new_v4(), changes).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn delete_returns_removed_and_then_not_found() {
        let s = seeded();
        let appt = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        assert_eq!(delete_appointment(&s.conn, &appt.id).unwrap().id, appt.id);
        assert!(matches!(
            delete_appointment(&s.conn, &appt.id),
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            get_appointment(&s.conn, &appt.id),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_of_invoiced_appointment_conflicts() {
        let s = seeded();
        let appt = create_appointment(&s.conn, &clock(), request(&s, s.doctor_x, at(10, 0))).unwrap();
        insert_invoice(
            &s.conn,
            &Invoice {
                id: Uuid::new_v4(),
                invoice_no: "INV-9".into(),
                patient: s.patient,
                appointment: appt.id,
                line_items: vec![LineItem {
                    description: "Visit".into(),
                    amount: 10.0,
                    quantity: 1,
                }],
                tax_percent: 0.0,
                discount_amount: 0.0,
                amounts: Amounts {
                    sub_total: 10.0,
                    tax_amount: 0.0,
                    total_amount: 10.0,
                },
                status: InvoiceStatus::Pending,
                payment_method: PaymentMethod::Cash,
                paid_at: None,
                lifecycle: RecordLifecycle::Active,
                created_at: at(9, 0),
                updated_at: at(9, 0),
            },
        )
        .unwrap();

        assert!(matches!(
            delete_appointment(&s.conn, &appt.id),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn get_expands_patient_and_doctor() {
        let s = seeded();
        let appt = create_appointment(&s.conn, &clock(), request(&s, s.doctor_y, at(10, 0))).unwrap();
        let detail = get_appointment(&s.conn, &appt.id).unwrap();
        assert_eq!(detail.patient.name, "Farhana");
        assert_eq!(detail.doctor.name, "Dr. Y");
    }
}
