use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::{format_instant, DatabaseError};
use crate::models::*;

pub fn insert_patient(
    conn: &Connection,
    patient: &Patient,
    created_at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, phone, email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.phone,
            patient.email,
            format_instant(created_at),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, phone, email FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, name, phone, email)| {
        Ok(Patient {
            id: parse_uuid("patients.id", &id)?,
            name,
            phone,
            email,
        })
    })
    .transpose()
}

pub fn patient_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_doctor(
    conn: &Connection,
    doctor: &Doctor,
    created_at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let availability = serde_json::to_string(&doctor.availability)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("availability JSON: {e}")))?;
    let off_dates = serde_json::to_string(&doctor.off_dates)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("off dates JSON: {e}")))?;

    conn.execute(
        "INSERT INTO doctors (id, name, specialty, availability, off_dates, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doctor.id.to_string(),
            doctor.name,
            doctor.specialty,
            availability,
            off_dates,
            format_instant(created_at),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, specialty, availability, off_dates FROM doctors WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(DoctorRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    specialty: row.get(2)?,
                    availability: row.get(3)?,
                    off_dates: row.get(4)?,
                })
            },
        )
        .optional()?;

    row.map(DoctorRow::into_doctor).transpose()
}

pub fn doctor_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM doctors WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Raw doctor columns as read from SQLite.
pub(crate) struct DoctorRow {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub availability: String,
    pub off_dates: String,
}

impl DoctorRow {
    pub(crate) fn into_doctor(self) -> Result<Doctor, DatabaseError> {
        let availability: Vec<AvailabilityWindow> = serde_json::from_str(&self.availability)
            .map_err(|_| DatabaseError::InvalidValue {
                field: "doctors.availability".into(),
                value: self.availability.clone(),
            })?;
        let off_dates: Vec<NaiveDate> =
            serde_json::from_str(&self.off_dates).map_err(|_| DatabaseError::InvalidValue {
                field: "doctors.off_dates".into(),
                value: self.off_dates.clone(),
            })?;
        Ok(Doctor {
            id: parse_uuid("doctors.id", &self.id)?,
            name: self.name,
            specialty: self.specialty,
            availability,
            off_dates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn patient_round_trip() {
        let conn = open_memory_database().unwrap();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Amina Rahman".into(),
            phone: Some("+8801700000000".into()),
            email: Some("amina@example.com".into()),
        };
        insert_patient(&conn, &patient, &at()).unwrap();

        assert_eq!(get_patient(&conn, &patient.id).unwrap(), Some(patient.clone()));
        assert!(patient_exists(&conn, &patient.id).unwrap());
        assert!(!patient_exists(&conn, &Uuid::new_v4()).unwrap());
    }

    #[test]
    fn doctor_keeps_availability_and_off_dates() {
        let conn = open_memory_database().unwrap();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            name: "Dr. Karim".into(),
            specialty: "Cardiology".into(),
            availability: vec![AvailabilityWindow {
                day: "Monday".into(),
                from_hour: 10,
                from_minute: 0,
                to_hour: 14,
                to_minute: 30,
            }],
            off_dates: vec![NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()],
        };
        insert_doctor(&conn, &doctor, &at()).unwrap();

        assert_eq!(get_doctor(&conn, &doctor.id).unwrap(), Some(doctor.clone()));
        assert!(doctor_exists(&conn, &doctor.id).unwrap());
    }

    #[test]
    fn duplicate_patient_id_is_unique_violation() {
        let conn = open_memory_database().unwrap();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Twice".into(),
            phone: None,
            email: None,
        };
        insert_patient(&conn, &patient, &at()).unwrap();
        let err = insert_patient(&conn, &patient, &at()).unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)));
    }
}
