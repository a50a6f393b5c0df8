//! Room (bed) endpoints.
//!
//! - `GET /api/rooms`: paginated list, newest first
//! - `GET /api/rooms/:id`
//! - `POST /api/rooms`
//! - `PUT /api/rooms/:id`: partial update
//! - `POST /api/rooms/:id/assign`: admit a patient
//! - `POST /api/rooms/:id/discharge`: free the bed
//! - `DELETE /api/rooms/:id`

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::endpoints::{present, text_field};
use crate::api::error::ApiError;
use crate::api::types::{double_option, page_parts, ApiContext, Envelope};
use crate::error::{parse_id, ServiceError};
use crate::models::*;
use crate::occupancy::{self, BedPatch};
use crate::scheduling::parse_datetime;

fn optional_instant(raw: Option<String>) -> Result<Option<chrono::DateTime<chrono::Utc>>, ServiceError> {
    present(raw).map(|raw| parse_datetime(&raw)).transpose()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub is_available: Option<String>,
    pub ward: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> Result<BedFilter, ServiceError> {
        let is_available = match present(self.is_available.clone()).as_deref().map(str::trim) {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                return Err(ServiceError::invalid(format!(
                    "isAvailable must be true or false, got {other:?}"
                )))
            }
        };
        Ok(BedFilter {
            is_available,
            ward: present(self.ward.clone()).map(|w| w.trim().to_string()),
        })
    }
}

#[derive(Serialize)]
pub struct RoomsPayload {
    pub rooms: Vec<BedRecord<Patient>>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct RoomPayload<T> {
    pub room: T,
}

/// `GET /api/rooms`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Envelope<RoomsPayload>, ApiError> {
    let Query(query) = query?;
    let filter = query.filter()?;
    let page = PageRequest::from_query(
        query.page.as_deref(),
        query.limit.as_deref(),
        ctx.core.config().default_page_size,
    );

    let result = ctx
        .with_db(move |conn, _| occupancy::list_beds(conn, &filter, page))
        .await?;
    let (rooms, pagination) = page_parts(result);

    Ok(Envelope::ok(
        "Rooms fetched successfully",
        RoomsPayload { rooms, pagination },
    ))
}

/// `GET /api/rooms/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Envelope<RoomPayload<BedRecord<Patient>>>, ApiError> {
    let id = parse_id("room", &id)?;
    let room = ctx.with_db(move |conn, _| occupancy::get_bed(conn, &id)).await?;
    Ok(Envelope::ok("Room fetched successfully", RoomPayload { room }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomBody {
    pub ward: Option<Value>,
    pub room_number: Option<Value>,
    pub bed_number: Option<Value>,
}

/// `POST /api/rooms`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<CreateRoomBody>, JsonRejection>,
) -> Result<Envelope<RoomPayload<Bed>>, ApiError> {
    let Json(body) = body?;
    let request = NewBed {
        ward: text_field("ward", body.ward)?.unwrap_or_default(),
        room_number: text_field("roomNumber", body.room_number)?.unwrap_or_default(),
        bed_number: text_field("bedNumber", body.bed_number)?.unwrap_or_default(),
    };

    let room = ctx
        .with_db(move |conn, core| occupancy::create_bed(conn, core.clock(), request))
        .await?;
    Ok(Envelope::created("Room created successfully", RoomPayload { room }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomBody {
    pub ward: Option<Value>,
    pub room_number: Option<Value>,
    pub bed_number: Option<Value>,
    pub is_available: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub patient: Option<Option<String>>,
    pub admitted_at: Option<String>,
    pub discharged_at: Option<String>,
}

impl UpdateRoomBody {
    fn into_patch(self) -> Result<BedPatch, ServiceError> {
        let patient = match self.patient {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) if raw.trim().is_empty() => Some(None),
            Some(Some(raw)) => Some(Some(parse_id("patient", &raw)?)),
        };
        Ok(BedPatch {
            ward: text_field("ward", self.ward)?,
            room_number: text_field("roomNumber", self.room_number)?,
            bed_number: text_field("bedNumber", self.bed_number)?,
            is_available: self.is_available,
            patient,
            admitted_at: optional_instant(self.admitted_at)?,
            discharged_at: optional_instant(self.discharged_at)?,
        })
    }
}

/// `PUT /api/rooms/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateRoomBody>, JsonRejection>,
) -> Result<Envelope<RoomPayload<Bed>>, ApiError> {
    let id = parse_id("room", &id)?;
    let Json(body) = body?;
    let patch = body.into_patch()?;

    let room = ctx
        .with_db(move |conn, core| occupancy::update_bed(conn, core.clock(), &id, patch))
        .await?;
    Ok(Envelope::ok("Room updated successfully", RoomPayload { room }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub patient: Option<String>,
    pub admitted_at: Option<String>,
}

/// `POST /api/rooms/:id/assign`
pub async fn assign(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Result<Json<AssignBody>, JsonRejection>,
) -> Result<Envelope<RoomPayload<Bed>>, ApiError> {
    let id = parse_id("room", &id)?;
    let Json(body) = body?;
    let Some(patient) = present(body.patient) else {
        return Err(ApiError::BadRequest("patient is required".into()));
    };
    let patient = parse_id("patient", &patient)?;
    let admitted_at = optional_instant(body.admitted_at)?;

    let room = ctx
        .with_db(move |conn, core| {
            occupancy::assign_patient(conn, core.clock(), &id, patient, admitted_at)
        })
        .await?;
    Ok(Envelope::ok("Patient assigned successfully", RoomPayload { room }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeBody {
    pub discharged_at: Option<String>,
}

/// `POST /api/rooms/:id/discharge`
///
/// The body is optional; without one the discharge is stamped now.
pub async fn discharge(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Envelope<RoomPayload<Bed>>, ApiError> {
    let id = parse_id("room", &id)?;
    let body: DischargeBody = if body.iter().all(u8::is_ascii_whitespace) {
        DischargeBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?
    };
    let discharged_at = optional_instant(body.discharged_at)?;

    let room = ctx
        .with_db(move |conn, core| occupancy::discharge(conn, core.clock(), &id, discharged_at))
        .await?;
    Ok(Envelope::ok("Patient discharged successfully", RoomPayload { room }))
}

/// `DELETE /api/rooms/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Envelope<RoomPayload<Bed>>, ApiError> {
    let id = parse_id("room", &id)?;
    let room = ctx.with_db(move |conn, _| occupancy::delete_bed(conn, &id)).await?;
    Ok(Envelope::ok("Room deleted successfully", RoomPayload { room }))
}
