use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_opt_instant, parse_uuid, WhereClause};
use crate::db::{format_instant, parse_instant, DatabaseError};
use crate::models::*;

const INVOICE_COLUMNS: &str = "i.id, i.invoice_no, i.patient_id, i.appointment_id, i.line_items,
                i.sub_total, i.tax_percent, i.tax_amount, i.discount_amount, i.total_amount,
                i.status, i.payment_method, i.paid_at, i.lifecycle, i.created_at, i.updated_at";

const DETAIL_SELECT: &str = "p.id, p.name, p.phone, p.email, a.id, a.datetime, a.status
         FROM invoices i
         JOIN patients p ON p.id = i.patient_id
         JOIN appointments a ON a.id = i.appointment_id";

/// Raw invoice columns as read from SQLite.
struct InvoiceRow {
    id: String,
    invoice_no: String,
    patient_id: String,
    appointment_id: String,
    line_items: String,
    sub_total: f64,
    tax_percent: f64,
    tax_amount: f64,
    discount_amount: f64,
    total_amount: f64,
    status: String,
    payment_method: String,
    paid_at: Option<String>,
    lifecycle: String,
    created_at: String,
    updated_at: String,
}

impl InvoiceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            invoice_no: row.get(1)?,
            patient_id: row.get(2)?,
            appointment_id: row.get(3)?,
            line_items: row.get(4)?,
            sub_total: row.get(5)?,
            tax_percent: row.get(6)?,
            tax_amount: row.get(7)?,
            discount_amount: row.get(8)?,
            total_amount: row.get(9)?,
            status: row.get(10)?,
            payment_method: row.get(11)?,
            paid_at: row.get(12)?,
            lifecycle: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_invoice(self) -> Result<Invoice, DatabaseError> {
        let line_items: Vec<LineItem> =
            serde_json::from_str(&self.line_items).map_err(|_| DatabaseError::InvalidValue {
                field: "invoices.line_items".into(),
                value: self.line_items.clone(),
            })?;
        Ok(Invoice {
            id: parse_uuid("invoices.id", &self.id)?,
            invoice_no: self.invoice_no,
            patient: parse_uuid("invoices.patient_id", &self.patient_id)?,
            appointment: parse_uuid("invoices.appointment_id", &self.appointment_id)?,
            line_items,
            tax_percent: self.tax_percent,
            discount_amount: self.discount_amount,
            amounts: Amounts {
                sub_total: self.sub_total,
                tax_amount: self.tax_amount,
                total_amount: self.total_amount,
            },
            status: self.status.parse()?,
            payment_method: self.payment_method.parse()?,
            paid_at: parse_opt_instant("invoices.paid_at", self.paid_at)?,
            lifecycle: self.lifecycle.parse()?,
            created_at: parse_instant("invoices.created_at", &self.created_at)?,
            updated_at: parse_instant("invoices.updated_at", &self.updated_at)?,
        })
    }
}

/// Invoice joined with its patient and appointment summary.
struct InvoiceDetailRow {
    invoice: InvoiceRow,
    patient: (String, String, Option<String>, Option<String>),
    appointment: (String, String, String),
}

impl InvoiceDetailRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            invoice: InvoiceRow::read(row)?,
            patient: (row.get(16)?, row.get(17)?, row.get(18)?, row.get(19)?),
            appointment: (row.get(20)?, row.get(21)?, row.get(22)?),
        })
    }

    fn into_detail(self) -> Result<Invoice<Patient, AppointmentSummary>, DatabaseError> {
        let (id, name, phone, email) = self.patient;
        let patient = Patient {
            id: parse_uuid("patients.id", &id)?,
            name,
            phone,
            email,
        };
        let (appt_id, datetime, status) = self.appointment;
        let appointment = AppointmentSummary {
            id: parse_uuid("appointments.id", &appt_id)?,
            datetime: parse_instant("appointments.datetime", &datetime)?,
            status: status.parse()?,
        };
        Ok(self.invoice.into_invoice()?.expand(patient, appointment))
    }
}

fn line_items_json(items: &[LineItem]) -> Result<String, DatabaseError> {
    serde_json::to_string(items)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("line items JSON: {e}")))
}

/// Insert an invoice. A reused invoice number fails with
/// [`DatabaseError::UniqueViolation`], whatever the other invoice's lifecycle.
pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO invoices (id, invoice_no, patient_id, appointment_id, line_items,
                               sub_total, tax_percent, tax_amount, discount_amount, total_amount,
                               status, payment_method, paid_at, lifecycle, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            invoice.id.to_string(),
            invoice.invoice_no,
            invoice.patient.to_string(),
            invoice.appointment.to_string(),
            line_items_json(&invoice.line_items)?,
            invoice.amounts.sub_total,
            invoice.tax_percent,
            invoice.amounts.tax_amount,
            invoice.discount_amount,
            invoice.amounts.total_amount,
            invoice.status.as_str(),
            invoice.payment_method.as_str(),
            invoice.paid_at.as_ref().map(format_instant),
            invoice.lifecycle.as_str(),
            format_instant(&invoice.created_at),
            format_instant(&invoice.updated_at),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

/// Fetch an invoice regardless of lifecycle.
pub fn get_invoice(conn: &Connection, id: &Uuid) -> Result<Option<Invoice>, DatabaseError> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.id = ?1");
    conn.query_row(&sql, params![id.to_string()], InvoiceRow::read)
        .optional()?
        .map(InvoiceRow::into_invoice)
        .transpose()
}

/// Active invoice with patient and appointment expanded.
pub fn get_invoice_detail(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Invoice<Patient, AppointmentSummary>>, DatabaseError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS}, {DETAIL_SELECT}
         WHERE i.id = ?1 AND i.lifecycle = 'active'"
    );
    conn.query_row(&sql, params![id.to_string()], InvoiceDetailRow::read)
        .optional()?
        .map(InvoiceDetailRow::into_detail)
        .transpose()
}

/// Persist the mutable fields of an active invoice. `paid_at` is only
/// written when the stored value is still unset. Returns `false` when no
/// active invoice has this id.
pub fn write_invoice(conn: &Connection, invoice: &Invoice) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE invoices
             SET line_items = ?2, sub_total = ?3, tax_percent = ?4, tax_amount = ?5,
                 discount_amount = ?6, total_amount = ?7, status = ?8, payment_method = ?9,
                 paid_at = COALESCE(paid_at, ?10), updated_at = ?11
             WHERE id = ?1 AND lifecycle = 'active'",
            params![
                invoice.id.to_string(),
                line_items_json(&invoice.line_items)?,
                invoice.amounts.sub_total,
                invoice.tax_percent,
                invoice.amounts.tax_amount,
                invoice.discount_amount,
                invoice.amounts.total_amount,
                invoice.status.as_str(),
                invoice.payment_method.as_str(),
                invoice.paid_at.as_ref().map(format_instant),
                format_instant(&invoice.updated_at),
            ],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

/// Soft-delete. Returns the deactivated invoice, or `None` when the id is
/// unknown or already inactive.
pub fn deactivate_invoice(
    conn: &Connection,
    id: &Uuid,
    updated_at: &chrono::DateTime<chrono::Utc>,
) -> Result<Option<Invoice>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx
        .execute(
            "UPDATE invoices SET lifecycle = 'inactive', updated_at = ?2
             WHERE id = ?1 AND lifecycle = 'active'",
            params![id.to_string(), format_instant(updated_at)],
        )
        .map_err(DatabaseError::from_write)?;
    if changed == 0 {
        return Ok(None);
    }
    let invoice = get_invoice(&tx, id)?;
    tx.commit()?;
    Ok(invoice)
}

/// One page of active invoices, newest first.
pub fn list_invoices(
    conn: &Connection,
    filter: &InvoiceFilter,
    page: PageRequest,
) -> Result<Page<Invoice<Patient, AppointmentSummary>>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause.push("i.lifecycle = {}", RecordLifecycle::Active.as_str().to_string());
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clause.push("instr(lower(i.invoice_no), lower({})) > 0", search.to_string());
    }
    let where_sql = clause.sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM invoices i{where_sql}"),
        clause.param_refs().as_slice(),
        |row| row.get(0),
    )?;

    let limit_idx = clause.next_index();
    let sql = format!(
        "SELECT {INVOICE_COLUMNS}, {DETAIL_SELECT}{where_sql}
         ORDER BY i.created_at DESC, i.invoice_no ASC
         LIMIT ?{limit_idx} OFFSET ?{}",
        limit_idx + 1
    );
    let mut refs = clause.param_refs();
    let limit = i64::from(page.limit);
    let offset = page.offset();
    refs.push(&limit);
    refs.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), InvoiceDetailRow::read)?;
    let items = rows
        .map(|r| r.map_err(DatabaseError::from).and_then(InvoiceDetailRow::into_detail))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        total: u64::try_from(total).unwrap_or(0),
        request: page,
    })
}
