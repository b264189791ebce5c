// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    ConflictAck, CreateAppointmentRequest, CreateRecurringRequest, RescheduleAppointmentRequest,
    SchedulingError, SchedulingOutcome,
};
use crate::services::booking::SchedulingService;
use crate::services::calendar::{CalendarProjection, CalendarView};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub view: Option<CalendarView>,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// HELPERS
// ==============================================================================

/// Every account is a clinic; scheduling calls carry its id explicitly.
fn clinic_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Authenticated user has no clinic context".to_string()))
}

fn map_error(err: SchedulingError) -> AppError {
    match err {
        SchedulingError::Validation(msg) => AppError::ValidationError(msg),
        SchedulingError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        SchedulingError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        SchedulingError::Auth(msg) => AppError::Auth(msg),
        SchedulingError::Persistence(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// SCHEDULING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Response, AppError> {
    let clinic = clinic_id(&user)?;
    let service = SchedulingService::new(&state);
    let ack = ConflictAck::from_confirmed(request.confirm_conflicts);

    let outcome = service
        .create_single(clinic, request.draft(), ack, auth.token())
        .await
        .map_err(map_error)?;

    Ok(match outcome {
        SchedulingOutcome::Booked(appointment) => Json(json!({
            "success": true,
            "appointment": appointment,
        }))
        .into_response(),
        SchedulingOutcome::AwaitingConfirmation { conflicts } => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "requires_confirmation": true,
                "conflicts": conflicts,
            })),
        )
            .into_response(),
    })
}

#[axum::debug_handler]
pub async fn create_recurring_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateRecurringRequest>,
) -> Result<Response, AppError> {
    let clinic = clinic_id(&user)?;
    let service = SchedulingService::new(&state);
    let ack = ConflictAck::from_confirmed(request.confirm_conflicts);
    let rule = request.rule().map_err(map_error)?;

    let outcome = service
        .create_recurring(clinic, request.draft(), rule, ack, auth.token())
        .await
        .map_err(map_error)?;

    Ok(match outcome {
        SchedulingOutcome::Booked(booking) => Json(json!({
            "success": true,
            "occurrence_count": booking.occurrence_count(),
            "parent": booking.parent,
            "children": booking.children,
        }))
        .into_response(),
        SchedulingOutcome::AwaitingConfirmation { conflicts } => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "requires_confirmation": true,
                "conflicts": conflicts,
            })),
        )
            .into_response(),
    })
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Response, AppError> {
    let clinic = clinic_id(&user)?;
    let service = SchedulingService::new(&state);
    let ack = ConflictAck::from_confirmed(request.confirm_conflicts);

    let outcome = service
        .reschedule(
            clinic,
            appointment_id,
            request.new_start_time,
            request.new_end_time,
            ack,
            auth.token(),
        )
        .await
        .map_err(map_error)?;

    Ok(match outcome {
        SchedulingOutcome::Booked(appointment) => Json(json!({
            "success": true,
            "appointment": appointment,
        }))
        .into_response(),
        SchedulingOutcome::AwaitingConfirmation { conflicts } => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "requires_confirmation": true,
                "conflicts": conflicts,
            })),
        )
            .into_response(),
    })
}

/// Read-only conflict probe used by the scheduling form while it is open.
#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let clinic = clinic_id(&user)?;
    let service = SchedulingService::new(&state);

    let conflicts = service
        .conflict_service()
        .check_conflicts(
            clinic,
            query.start_time,
            query.end_time,
            query.exclude_appointment_id,
            auth.token(),
        )
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "has_conflicts": !conflicts.is_empty(),
        "conflicts": conflicts,
    })))
}

#[axum::debug_handler]
pub async fn calendar_view(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let clinic = clinic_id(&user)?;
    let service = SchedulingService::new(&state);

    let appointments = service
        .clinic_appointments(clinic, auth.token())
        .await
        .map_err(map_error)?;

    let view = query.view.unwrap_or(CalendarView::Week);
    let anchor = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let projection = CalendarProjection::new(view, anchor);

    Ok(Json(json!({
        "calendar": projection.project(&appointments),
    })))
}
