//! Billing endpoints.
//!
//! - `GET /api/billing?search&page&limit`: active invoices, newest first
//! - `GET /api/billing/:id`
//! - `POST /api/billing/create`
//! - `PUT /api/billing/edit/:id`
//! - `DELETE /api/billing/:id`: soft delete

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::endpoints::{parse_enum, present, text_field};
use crate::api::error::ApiError;
use crate::api::types::{page_parts, ApiContext, Envelope};
use crate::error::parse_id;
use crate::ledger;
use crate::models::*;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
pub struct BillsPayload {
    pub bills: Vec<Invoice<Patient, AppointmentSummary>>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct BillPayload<T> {
    pub bill: T,
}

/// `GET /api/billing`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Envelope<BillsPayload>, ApiError> {
    let Query(query) = query?;
    let filter = InvoiceFilter {
        search: present(query.search).map(|s| s.trim().to_string()),
    };
    let page = PageRequest::from_query(
        query.page.as_deref(),
        query.limit.as_deref(),
        ctx.core.config().default_page_size,
    );

    let result = ctx
        .with_db(move |conn, _| ledger::list_invoices(conn, &filter, page))
        .await?;
    let (bills, pagination) = page_parts(result);

    Ok(Envelope::ok(
        "Bills fetched successfully",
        BillsPayload { bills, pagination },
    ))
}

/// `GET /api/billing/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Envelope<BillPayload<Invoice<Patient, AppointmentSummary>>>, ApiError> {
    let id = parse_id("bill", &id)?;
    let bill = ctx.with_db(move |conn, _| ledger::get_invoice(conn, &id)).await?;
    Ok(Envelope::ok("Bill fetched successfully", BillPayload { bill }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillBody {
    pub invoice_no: Option<Value>,
    pub patient: Option<String>,
    pub appointment: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub tax_percent: Option<f64>,
    pub discount_amount: Option<f64>,
    pub payment_method: Option<String>,
}

/// `POST /api/billing/create`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<CreateBillBody>, JsonRejection>,
) -> Result<Envelope<BillPayload<Invoice>>, ApiError> {
    let Json(body) = body?;
    let invoice_no = present(text_field("invoiceNo", body.invoice_no)?);
    let (Some(invoice_no), Some(patient), Some(appointment), Some(line_items)) = (
        invoice_no,
        present(body.patient),
        present(body.appointment),
        body.line_items,
    ) else {
        return Err(ApiError::BadRequest(
            "invoiceNo, patient, appointment and lineItems are required".into(),
        ));
    };

    let request = NewInvoice {
        invoice_no,
        patient_id: parse_id("patient", &patient)?,
        appointment_id: parse_id("appointment", &appointment)?,
        line_items,
        tax_percent: body.tax_percent.unwrap_or(0.0),
        discount_amount: body.discount_amount.unwrap_or(0.0),
        payment_method: present(body.payment_method)
            .map(|raw| parse_enum("paymentMethod", &raw))
            .transpose()?
            .unwrap_or_default(),
    };

    let bill = ctx
        .with_db(move |conn, core| ledger::create_invoice(conn, core.clock(), request))
        .await?;
    Ok(Envelope::created("Bill created successfully", BillPayload { bill }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditBillBody {
    pub line_items: Option<Vec<LineItem>>,
    pub tax_percent: Option<f64>,
    pub discount_amount: Option<f64>,
    pub status: Option<String>,
    pub payment_method: Option<String>,
}

/// `PUT /api/billing/edit/:id`
pub async fn edit(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Result<Json<EditBillBody>, JsonRejection>,
) -> Result<Envelope<BillPayload<Invoice>>, ApiError> {
    let id = parse_id("bill", &id)?;
    let Json(body) = body?;

    let changes = InvoiceChanges {
        line_items: body.line_items,
        tax_percent: body.tax_percent,
        discount_amount: body.discount_amount,
        status: present(body.status)
            .map(|raw| parse_enum("status", &raw))
            .transpose()?,
        payment_method: present(body.payment_method)
            .map(|raw| parse_enum("paymentMethod", &raw))
            .transpose()?,
    };

    let bill = ctx
        .with_db(move |conn, core| ledger::update_invoice(conn, core.clock(), &id, changes))
        .await?;
    Ok(Envelope::ok("Bill updated successfully", BillPayload { bill }))
}

/// `DELETE /api/billing/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Envelope<BillPayload<Invoice>>, ApiError> {
    let id = parse_id("bill", &id)?;
    let bill = ctx
        .with_db(move |conn, core| ledger::deactivate_invoice(conn, core.clock(), &id))
        .await?;
    Ok(Envelope::ok("Bill deleted successfully", BillPayload { bill }))
}
