//! Appointment endpoints.
//!
//! - `GET /api/appointments/slots?date=YYYY-MM-DD`: free slots of a day
//! - `GET /api/appointments`: paginated list, patient and doctor expanded
//! - `GET /api/appointments/:id`
//! - `POST /api/appointments`: reserve
//! - `PUT /api/appointments/:id`: reschedule and/or change status
//! - `DELETE /api/appointments/:id`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::endpoints::{parse_enum, present};
use crate::api::error::ApiError;
use crate::api::types::{page_parts, ApiContext, Envelope};
use crate::error::{parse_id, ServiceError};
use crate::models::*;
use crate::scheduling;

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct SlotsPayload {
    pub slots: Vec<String>,
}

/// `GET /api/appointments/slots`
pub async fn slots(
    State(ctx): State<ApiContext>,
    query: Result<Query<SlotQuery>, QueryRejection>,
) -> Result<Envelope<SlotsPayload>, ApiError> {
    let Query(query) = query?;
    let date = scheduling::parse_date(query.date.as_deref())?;

    let slots = ctx
        .with_db(move |conn, core| scheduling::slots_for_date(conn, date, core.business_hours()))
        .await?;

    Ok(Envelope::ok(
        "Available slots fetched successfully",
        SlotsPayload { slots },
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> Result<AppointmentFilter, ServiceError> {
        Ok(AppointmentFilter {
            patient_id: present(self.patient_id.clone())
                .map(|raw| parse_id("patient", &raw))
                .transpose()?,
            doctor_id: present(self.doctor_id.clone())
                .map(|raw| parse_id("doctor", &raw))
                .transpose()?,
            status: present(self.status.clone())
                .map(|raw| parse_enum("status", &raw))
                .transpose()?,
        })
    }
}

#[derive(Serialize)]
pub struct AppointmentsPayload {
    pub appointments: Vec<Appointment<Patient, Doctor>>,
    pub pagination: Pagination,
}

/// `GET /api/appointments`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Envelope<AppointmentsPayload>, ApiError> {
    let Query(query) = query?;
    let filter = query.filter()?;
    let page = PageRequest::from_query(
        query.page.as_deref(),
        query.limit.as_deref(),
        ctx.core.config().default_page_size,
    );

    let result = ctx
        .with_db(move |conn, _| scheduling::list_appointments(conn, &filter, page))
        .await?;
    let (appointments, pagination) = page_parts(result);

    Ok(Envelope::ok(
        "Appointments fetched successfully",
        AppointmentsPayload {
            appointments,
            pagination,
        },
    ))
}

#[derive(Serialize)]
pub struct AppointmentPayload<T> {
    pub appointment: T,
}

/// `GET /api/appointments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Envelope<AppointmentPayload<Appointment<Patient, Doctor>>>, ApiError> {
    let id = parse_id("appointment", &id)?;
    let appointment = ctx
        .with_db(move |conn, _| scheduling::get_appointment(conn, &id))
        .await?;
    Ok(Envelope::ok(
        "Appointment fetched successfully",
        AppointmentPayload { appointment },
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentBody {
    pub patient: Option<String>,
    pub doctor: Option<String>,
    pub datetime: Option<String>,
}

/// `POST /api/appointments`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<CreateAppointmentBody>, JsonRejection>,
) -> Result<Envelope<AppointmentPayload<Appointment>>, ApiError> {
    let Json(body) = body?;
    let (Some(patient), Some(doctor), Some(datetime)) = (
        present(body.patient),
        present(body.doctor),
        present(body.datetime),
    ) else {
        return Err(ApiError::BadRequest(
            "patient, doctor and datetime are required".into(),
        ));
    };

    let request = NewAppointment {
        patient_id: parse_id("patient", &patient)?,
        doctor_id: parse_id("doctor", &doctor)?,
        datetime: scheduling::parse_datetime(&datetime)?,
    };

    let appointment = ctx
        .with_db(move |conn, core| scheduling::create_appointment(conn, core.clock(), request))
        .await?;
    Ok(Envelope::created(
        "Appointment created successfully",
        AppointmentPayload { appointment },
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentBody {
    pub datetime: Option<String>,
    pub status: Option<String>,
}

/// `PUT /api/appointments/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateAppointmentBody>, JsonRejection>,
) -> Result<Envelope<AppointmentPayload<Appointment>>, ApiError> {
    let id = parse_id("appointment", &id)?;
    let Json(body) = body?;

    let changes = AppointmentChanges {
        datetime: present(body.datetime)
            .map(|raw| scheduling::parse_datetime(&raw))
            .transpose()?,
        status: present(body.status)
            .map(|raw| parse_enum("status", &raw))
            .transpose()?,
    };

    let appointment = ctx
        .with_db(move |conn, core| {
            scheduling::reschedule_appointment(conn, core.clock(), &id, changes)
        })
        .await?;
    Ok(Envelope::ok(
        "Appointment updated successfully",
        AppointmentPayload { appointment },
    ))
}

/// `DELETE /api/appointments/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Envelope<AppointmentPayload<Appointment>>, ApiError> {
    let id = parse_id("appointment", &id)?;
    let appointment = ctx
        .with_db(move |conn, _| scheduling::delete_appointment(conn, &id))
        .await?;
    Ok(Envelope::ok(
        "Appointment deleted successfully",
        AppointmentPayload { appointment },
    ))
}
