//! Invoices and their derived amounts.
//!
//! `subTotal`, `taxAmount` and `totalAmount` are never taken from callers:
//! they are recomputed by [`compute_amounts`] whenever an input changes.

use rusqlite::Connection;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{begin_immediate, repository, DatabaseError};
use crate::error::ServiceError;
use crate::models::*;

/// Half-up rounding to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derive the invoice amounts.
///
/// `taxAmount` and `totalAmount` are rounded independently; `subTotal` is
/// the raw sum.
pub fn compute_amounts(line_items: &[LineItem], tax_percent: f64, discount_amount: f64) -> Amounts {
    let sub_total: f64 = line_items
        .iter()
        .map(|item| item.amount * f64::from(item.quantity))
        .sum();
    let tax_amount = round2(sub_total * tax_percent / 100.0);
    let total_amount = round2(sub_total + tax_amount - discount_amount);
    Amounts {
        sub_total,
        tax_amount,
        total_amount,
    }
}

fn validate_line_items(items: &[LineItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::invalid("At least one line item is required"));
    }
    for (index, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(ServiceError::invalid(format!(
                "lineItems[{index}].description is required"
            )));
        }
        if !item.amount.is_finite() || item.amount < 0.0 {
            return Err(ServiceError::invalid(format!(
                "lineItems[{index}].amount must be a non-negative number"
            )));
        }
        if item.quantity < 1 {
            return Err(ServiceError::invalid(format!(
                "lineItems[{index}].quantity must be at least 1"
            )));
        }
    }
    Ok(())
}

/// Validate the amount inputs and derive the amounts from them.
fn price(line_items: &[LineItem], tax_percent: f64, discount_amount: f64) -> Result<Amounts, ServiceError> {
    validate_line_items(line_items)?;
    if !tax_percent.is_finite() || !(0.0..=100.0).contains(&tax_percent) {
        return Err(ServiceError::invalid("taxPercent must be between 0 and 100"));
    }
    if !discount_amount.is_finite() || discount_amount < 0.0 {
        return Err(ServiceError::invalid("discountAmount must not be negative"));
    }
    let amounts = compute_amounts(line_items, tax_percent, discount_amount);
    if amounts.total_amount < 0.0 {
        return Err(ServiceError::invalid(
            "discountAmount exceeds the invoice total",
        ));
    }
    Ok(amounts)
}

/// Issue an invoice for an appointment.
pub fn create_invoice(
    conn: &Connection,
    clock: &dyn Clock,
    request: NewInvoice,
) -> Result<Invoice, ServiceError> {
    let invoice_no = request.invoice_no.trim().to_string();
    if invoice_no.is_empty() {
        return Err(ServiceError::invalid("invoiceNo is required"));
    }
    let amounts = price(&request.line_items, request.tax_percent, request.discount_amount)?;

    if !repository::patient_exists(conn, &request.patient_id)? {
        return Err(ServiceError::not_found("Patient", request.patient_id));
    }
    if repository::get_appointment(conn, &request.appointment_id)?.is_none() {
        return Err(ServiceError::not_found("Appointment", request.appointment_id));
    }

    let now = clock.now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        invoice_no,
        patient: request.patient_id,
        appointment: request.appointment_id,
        line_items: request.line_items,
        tax_percent: request.tax_percent,
        discount_amount: request.discount_amount,
        amounts,
        status: InvoiceStatus::Pending,
        payment_method: request.payment_method,
        paid_at: None,
        lifecycle: RecordLifecycle::Active,
        created_at: now,
        updated_at: now,
    };

    repository::insert_invoice(conn, &invoice).map_err(|e| match e {
        DatabaseError::ForeignKeyViolation(_) => {
            ServiceError::not_found("Patient or appointment", invoice.appointment)
        }
        other => ServiceError::from_write(other, "Invoice number already exists"),
    })?;

    tracing::info!(
        invoice_id = %invoice.id,
        invoice_no = %invoice.invoice_no,
        total = invoice.amounts.total_amount,
        "invoice created"
    );
    Ok(invoice)
}

/// Apply a partial update to an active invoice.
///
/// The first transition to `paid` stamps `paidAt`; later ones keep it.
/// A rejected update leaves the stored invoice untouched.
pub fn update_invoice(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
    changes: InvoiceChanges,
) -> Result<Invoice, ServiceError> {
    if changes.is_empty() {
        return Err(ServiceError::invalid("No valid fields provided for update"));
    }

    let tx = begin_immediate(conn)?;
    let mut invoice = repository::get_invoice(&tx, id)?
        .filter(Invoice::is_active)
        .ok_or_else(|| ServiceError::not_found("Invoice", id))?;

    let touches_amounts = changes.touches_amounts();
    if let Some(items) = changes.line_items {
        invoice.line_items = items;
    }
    if let Some(tax) = changes.tax_percent {
        invoice.tax_percent = tax;
    }
    if let Some(discount) = changes.discount_amount {
        invoice.discount_amount = discount;
    }
    if touches_amounts {
        invoice.amounts = price(&invoice.line_items, invoice.tax_percent, invoice.discount_amount)?;
    }
    if let Some(method) = changes.payment_method {
        invoice.payment_method = method;
    }

    let now = clock.now();
    if let Some(status) = changes.status {
        invoice.status = status;
        if status == InvoiceStatus::Paid && invoice.paid_at.is_none() {
            invoice.paid_at = Some(now);
        }
    }
    invoice.updated_at = now;

    if !repository::write_invoice(&tx, &invoice)? {
        return Err(ServiceError::not_found("Invoice", id));
    }
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        invoice_id = %invoice.id,
        status = %invoice.status,
        total = invoice.amounts.total_amount,
        "invoice updated"
    );
    Ok(invoice)
}

/// Soft-delete an invoice. Its number stays reserved.
pub fn deactivate_invoice(conn: &Connection, clock: &dyn Clock, id: &Uuid) -> Result<Invoice, ServiceError> {
    let invoice = repository::deactivate_invoice(conn, id, &clock.now())?
        .ok_or_else(|| ServiceError::not_found("Invoice", id))?;
    tracing::info!(invoice_id = %invoice.id, "invoice deactivated");
    Ok(invoice)
}

pub fn get_invoice(
    conn: &Connection,
    id: &Uuid,
) -> Result<Invoice<Patient, AppointmentSummary>, ServiceError> {
    repository::get_invoice_detail(conn, id)?.ok_or_else(|| ServiceError::not_found("Invoice", id))
}

pub fn list_invoices(
    conn: &Connection,
    filter: &InvoiceFilter,
    page: PageRequest,
) -> Result<Page<Invoice<Patient, AppointmentSummary>>, ServiceError> {
    Ok(repository::list_invoices(conn, filter, page)?)
}
