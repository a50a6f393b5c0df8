use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_opt_instant, parse_uuid, WhereClause};
use crate::db::{format_instant, parse_instant, DatabaseError};
use crate::models::*;

const BED_COLUMNS: &str = "b.id, b.ward, b.room_number, b.bed_number, b.is_available, b.patient_id,
                b.admitted_at, b.discharged_at, b.created_at, b.updated_at";

/// Raw bed columns as read from SQLite.
struct BedRow {
    id: String,
    ward: String,
    room_number: String,
    bed_number: String,
    is_available: bool,
    patient_id: Option<String>,
    admitted_at: Option<String>,
    discharged_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BedRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ward: row.get(1)?,
            room_number: row.get(2)?,
            bed_number: row.get(3)?,
            is_available: row.get(4)?,
            patient_id: row.get(5)?,
            admitted_at: row.get(6)?,
            discharged_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_bed(self) -> Result<Bed, DatabaseError> {
        let occupancy = match (self.is_available, self.patient_id) {
            (true, None) => Occupancy::Free {
                discharged_at: parse_opt_instant("beds.discharged_at", self.discharged_at)?,
            },
            (false, Some(patient)) => {
                let raw = self.admitted_at.ok_or_else(|| DatabaseError::InvalidValue {
                    field: "beds.admitted_at".into(),
                    value: "NULL".into(),
                })?;
                Occupancy::Occupied {
                    patient: parse_uuid("beds.patient_id", &patient)?,
                    admitted_at: parse_instant("beds.admitted_at", &raw)?,
                }
            }
            (available, patient) => {
                return Err(DatabaseError::InvalidValue {
                    field: "beds.is_available".into(),
                    value: format!("{available} with patient {patient:?}"),
                })
            }
        };

        Ok(Bed {
            id: parse_uuid("beds.id", &self.id)?,
            ward: self.ward,
            room_number: self.room_number,
            bed_number: self.bed_number,
            occupancy,
            created_at: parse_instant("beds.created_at", &self.created_at)?,
            updated_at: parse_instant("beds.updated_at", &self.updated_at)?,
        })
    }
}

/// Bed row plus the occupying patient, if any.
struct BedPatientRow {
    bed: BedRow,
    patient: Option<(String, String, Option<String>, Option<String>)>,
}

impl BedPatientRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        let patient_id: Option<String> = row.get(10)?;
        let patient = match patient_id {
            Some(id) => Some((id, row.get(11)?, row.get(12)?, row.get(13)?)),
            None => None,
        };
        Ok(Self {
            bed: BedRow::read(row)?,
            patient,
        })
    }

    fn into_record(self) -> Result<BedRecord<Patient>, DatabaseError> {
        let bed = self.bed.into_bed()?;
        let patient = self
            .patient
            .map(|(id, name, phone, email)| {
                Ok::<_, DatabaseError>(Patient {
                    id: parse_uuid("patients.id", &id)?,
                    name,
                    phone,
                    email,
                })
            })
            .transpose()?;
        Ok(bed.record_with(patient))
    }
}

pub fn insert_bed(conn: &Connection, bed: &Bed) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO beds (id, ward, room_number, bed_number, is_available, patient_id,
                           admitted_at, discharged_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            bed.id.to_string(),
            bed.ward,
            bed.room_number,
            bed.bed_number,
            bed.occupancy.is_available(),
            bed.occupancy.patient().map(|p| p.to_string()),
            bed.occupancy.admitted_at().as_ref().map(format_instant),
            bed.occupancy.discharged_at().as_ref().map(format_instant),
            format_instant(&bed.created_at),
            format_instant(&bed.updated_at),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_bed(conn: &Connection, id: &Uuid) -> Result<Option<Bed>, DatabaseError> {
    let sql = format!("SELECT {BED_COLUMNS} FROM beds b WHERE b.id = ?1");
    conn.query_row(&sql, params![id.to_string()], BedRow::read)
        .optional()?
        .map(BedRow::into_bed)
        .transpose()
}

/// Bed with its occupying patient expanded.
pub fn get_bed_detail(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<BedRecord<Patient>>, DatabaseError> {
    let sql = format!(
        "SELECT {BED_COLUMNS}, p.id, p.name, p.phone, p.email
         FROM beds b LEFT JOIN patients p ON p.id = b.patient_id
         WHERE b.id = ?1"
    );
    conn.query_row(&sql, params![id.to_string()], BedPatientRow::read)
        .optional()?
        .map(BedPatientRow::into_record)
        .transpose()
}

/// Overwrite every mutable column of an existing bed. Returns `false` when
/// the id does not resolve.
pub fn write_bed(conn: &Connection, bed: &Bed) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE beds
             SET ward = ?2, room_number = ?3, bed_number = ?4, is_available = ?5,
                 patient_id = ?6, admitted_at = ?7, discharged_at = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                bed.id.to_string(),
                bed.ward,
                bed.room_number,
                bed.bed_number,
                bed.occupancy.is_available(),
                bed.occupancy.patient().map(|p| p.to_string()),
                bed.occupancy.admitted_at().as_ref().map(format_instant),
                bed.occupancy.discharged_at().as_ref().map(format_instant),
                format_instant(&bed.updated_at),
            ],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

/// Remove a bed, returning the removed record.
pub fn delete_bed(conn: &Connection, id: &Uuid) -> Result<Option<Bed>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let Some(existing) = get_bed(&tx, id)? else {
        return Ok(None);
    };
    tx.execute("DELETE FROM beds WHERE id = ?1", params![id.to_string()])
        .map_err(DatabaseError::from_write)?;
    tx.commit()?;
    Ok(Some(existing))
}

/// One page of beds, newest first, with patients expanded.
pub fn list_beds(
    conn: &Connection,
    filter: &BedFilter,
    page: PageRequest,
) -> Result<Page<BedRecord<Patient>>, DatabaseError> {
    let mut clause = WhereClause::new();
    if let Some(available) = filter.is_available {
        clause.push("b.is_available = {}", available);
    }
    if let Some(ward) = &filter.ward {
        clause.push("b.ward = {}", ward.clone());
    }
    let where_sql = clause.sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM beds b{where_sql}"),
        clause.param_refs().as_slice(),
        |row| row.get(0),
    )?;

    let limit_idx = clause.next_index();
    let sql = format!(
        "SELECT {BED_COLUMNS}, p.id, p.name, p.phone, p.email
         FROM beds b LEFT JOIN patients p ON p.id = b.patient_id{where_sql}
         ORDER BY b.created_at DESC, b.id ASC
         LIMIT ?{limit_idx} OFFSET ?{}",
        limit_idx + 1
    );
    let mut refs = clause.param_refs();
    let limit = i64::from(page.limit);
    let offset = page.offset();
    refs.push(&limit);
    refs.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), BedPatientRow::read)?;
    let items = rows
        .map(|r| r.map_err(DatabaseError::from).and_then(BedPatientRow::into_record))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        total: u64::try_from(total).unwrap_or(0),
        request: page,
    })
}
