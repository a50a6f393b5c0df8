use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::directory::DoctorRow;
use super::{parse_uuid, WhereClause};
use crate::db::{format_instant, parse_instant, DatabaseError};
use crate::models::*;

const APPOINTMENT_COLUMNS: &str =
    "a.id, a.patient_id, a.doctor_id, a.datetime, a.status, a.created_at, a.updated_at";

const EXPANDED_COLUMNS: &str = "a.id, a.patient_id, a.doctor_id, a.datetime, a.status, a.created_at, a.updated_at,
                p.id, p.name, p.phone, p.email,
                d.id, d.name, d.specialty, d.availability, d.off_dates";

const EXPANDED_FROM: &str = "FROM appointments a
         JOIN patients p ON p.id = a.patient_id
         JOIN doctors d ON d.id = a.doctor_id";

/// Raw appointment columns as read from SQLite.
struct AppointmentRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    datetime: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl AppointmentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            datetime: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_appointment(self) -> Result<Appointment, DatabaseError> {
        Ok(Appointment {
            id: parse_uuid("appointments.id", &self.id)?,
            patient: parse_uuid("appointments.patient_id", &self.patient_id)?,
            doctor: parse_uuid("appointments.doctor_id", &self.doctor_id)?,
            datetime: parse_instant("appointments.datetime", &self.datetime)?,
            status: self.status.parse()?,
            created_at: parse_instant("appointments.created_at", &self.created_at)?,
            updated_at: parse_instant("appointments.updated_at", &self.updated_at)?,
        })
    }
}

/// Appointment joined with its patient and doctor.
struct ExpandedRow {
    appointment: AppointmentRow,
    patient: (String, String, Option<String>, Option<String>),
    doctor: DoctorRow,
}

impl ExpandedRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            appointment: AppointmentRow::read(row)?,
            patient: (row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?),
            doctor: DoctorRow {
                id: row.get(11)?,
                name: row.get(12)?,
                specialty: row.get(13)?,
                availability: row.get(14)?,
                off_dates: row.get(15)?,
            },
        })
    }

    fn into_detail(self) -> Result<Appointment<Patient, Doctor>, DatabaseError> {
        let (id, name, phone, email) = self.patient;
        let patient = Patient {
            id: parse_uuid("patients.id", &id)?,
            name,
            phone,
            email,
        };
        let doctor = self.doctor.into_doctor()?;
        Ok(self.appointment.into_appointment()?.expand(patient, doctor))
    }
}

/// Insert an appointment. A second live booking of the same doctor at the
/// same instant fails with [`DatabaseError::UniqueViolation`].
pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, datetime, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appt.id.to_string(),
            appt.patient.to_string(),
            appt.doctor.to_string(),
            format_instant(&appt.datetime),
            appt.status.as_str(),
            format_instant(&appt.created_at),
            format_instant(&appt.updated_at),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1");
    conn.query_row(&sql, params![id.to_string()], AppointmentRow::read)
        .optional()?
        .map(AppointmentRow::into_appointment)
        .transpose()
}

pub fn get_appointment_detail(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Appointment<Patient, Doctor>>, DatabaseError> {
    let sql = format!("SELECT {EXPANDED_COLUMNS} {EXPANDED_FROM} WHERE a.id = ?1");
    conn.query_row(&sql, params![id.to_string()], ExpandedRow::read)
        .optional()?
        .map(ExpandedRow::into_detail)
        .transpose()
}

/// Apply a partial update in one statement. Returns `None` when the id
/// does not resolve.
pub fn update_appointment(
    conn: &Connection,
    id: &Uuid,
    changes: &AppointmentChanges,
    updated_at: &DateTime<Utc>,
) -> Result<Option<Appointment>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx
        .execute(
            "UPDATE appointments
             SET datetime = COALESCE(?2, datetime),
                 status = COALESCE(?3, status),
                 updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                changes.datetime.as_ref().map(format_instant),
                changes.status.map(|s| s.as_str()),
                format_instant(updated_at),
            ],
        )
        .map_err(DatabaseError::from_write)?;

    if changed == 0 {
        return Ok(None);
    }
    let updated = get_appointment(&tx, id)?;
    tx.commit()?;
    Ok(updated)
}

/// Remove an appointment, returning the removed record.
pub fn delete_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let Some(existing) = get_appointment(&tx, id)? else {
        return Ok(None);
    };
    tx.execute("DELETE FROM appointments WHERE id = ?1", params![id.to_string()])
        .map_err(DatabaseError::from_write)?;
    tx.commit()?;
    Ok(Some(existing))
}

/// Instants in `[from, to)` of every appointment, whatever its status.
pub fn booked_instants_between(
    conn: &Connection,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT datetime FROM appointments
         WHERE datetime >= ?1 AND datetime < ?2
         ORDER BY datetime ASC",
    )?;
    let rows = stmt.query_map(params![format_instant(from), format_instant(to)], |row| {
        row.get::<_, String>(0)
    })?;

    rows.map(|r| {
        let raw = r?;
        parse_instant("appointments.datetime", &raw)
    })
    .collect()
}

/// One page of appointments, ascending by instant, with patient and doctor
/// expanded.
///
/// The count and the fetch are separate reads; concurrent writes between
/// them can make the page metadata approximate.
pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
    page: PageRequest,
) -> Result<Page<Appointment<Patient, Doctor>>, DatabaseError> {
    let mut clause = WhereClause::new();
    if let Some(patient_id) = filter.patient_id {
        clause.push("a.patient_id = {}", patient_id.to_string());
    }
    if let Some(doctor_id) = filter.doctor_id {
        clause.push("a.doctor_id = {}", doctor_id.to_string());
    }
    if let Some(status) = filter.status {
        clause.push("a.status = {}", status.as_str().to_string());
    }
    let where_sql = clause.sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM appointments a{where_sql}"),
        clause.param_refs().as_slice(),
        |row| row.get(0),
    )?;

    let limit_idx = clause.next_index();
    let sql = format!(
        "SELECT {EXPANDED_COLUMNS} {EXPANDED_FROM}{where_sql}
         ORDER BY a.datetime ASC, a.created_at ASC
         LIMIT ?{limit_idx} OFFSET ?{}",
        limit_idx + 1
    );
    let mut refs = clause.param_refs();
    let limit = i64::from(page.limit);
    let offset = page.offset();
    refs.push(&limit);
    refs.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), ExpandedRow::read)?;
    let items = rows
        .map(|r| r.map_err(DatabaseError::from).and_then(ExpandedRow::into_detail))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        total: u64::try_from(total).unwrap_or(0),
        request: page,
    })
}
