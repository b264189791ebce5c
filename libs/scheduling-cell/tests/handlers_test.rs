// libs/scheduling-cell/tests/handlers_test.rs
//
// Handlers invoked directly with a mock Supabase behind the config, the way
// the booking UI drives them: create, hit the conflict dialog, confirm.
mod support;

use axum::body::to_bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use scheduling_cell::handlers::{
    calendar_view, check_conflicts, create_appointment, create_recurring_appointment,
    reschedule_appointment, CalendarQuery, ConflictCheckQuery,
};
use scheduling_cell::models::{
    AppointmentStatus, CreateAppointmentRequest, CreateRecurringRequest,
    RescheduleAppointmentRequest, RecurrenceEndType,
};
use scheduling_cell::recurrence::Frequency;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::TestConfig;

use support::utc;

fn clinic_user(clinic: Uuid) -> Extension<User> {
    Extension(User {
        id: clinic.to_string(),
        email: Some("clinic@example.com".to_string()),
        role: Some("clinic".to_string()),
        metadata: None,
        created_at: None,
    })
}

fn bearer() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn appointment_row(clinic: Uuid, patient: Uuid, start: &str, end: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "clinic_id": clinic,
        "patient_id": patient,
        "title": "Existing",
        "description": null,
        "start_time": start,
        "end_time": end,
        "status": "scheduled",
        "is_recurring": false,
        "recurrence_rule": null,
        "recurrence_parent_id": null,
        "created_at": "2024-05-01T00:00:00Z",
        "updated_at": "2024-05-01T00:00:00Z"
    })
}

async fn mock_patient(server: &MockServer, patient: Uuid) {
    Mock::given(method("GET"))
        .and(url_path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": patient, "full_name": "Ada Lovelace"}
        ])))
        .mount(server)
        .await;
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_request(patient: Uuid, confirm: bool) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id: patient,
        title: "New visit".to_string(),
        description: None,
        start_time: utc(2024, 5, 6, 9, 15),
        end_time: utc(2024, 5, 6, 9, 45),
        status: AppointmentStatus::Scheduled,
        confirm_conflicts: confirm,
    }
}

#[tokio::test]
async fn booking_a_free_slot_succeeds() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();
    let patient = Uuid::new_v4();

    mock_patient(&server, patient).await;
    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-05-06T09:15:00Z",
            "2024-05-06T09:45:00Z"
        )])))
        .mount(&server)
        .await;

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let response = create_appointment(
        State(state),
        bearer(),
        clinic_user(clinic),
        Json(create_request(patient, false)),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["appointment"]["id"].is_string());
}

#[tokio::test]
async fn conflicting_slot_returns_409_with_every_conflict_named() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();
    let patient = Uuid::new_v4();

    mock_patient(&server, patient).await;
    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-05-06T09:00:00Z",
            "2024-05-06T09:30:00Z"
        )])))
        .mount(&server)
        .await;

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let response = create_appointment(
        State(state),
        bearer(),
        clinic_user(clinic),
        Json(create_request(patient, false)),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["requires_confirmation"], json!(true));
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(body["conflicts"][0]["patient_name"], json!("Ada Lovelace"));
}

#[tokio::test]
async fn confirmed_request_books_over_the_conflict() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();
    let patient = Uuid::new_v4();

    mock_patient(&server, patient).await;
    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-05-06T09:00:00Z",
            "2024-05-06T09:30:00Z"
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-05-06T09:15:00Z",
            "2024-05-06T09:45:00Z"
        )])))
        .mount(&server)
        .await;

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let response = create_appointment(
        State(state),
        bearer(),
        clinic_user(clinic),
        Json(create_request(patient, true)),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn recurring_booking_reports_the_series_size() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();
    let patient = Uuid::new_v4();

    mock_patient(&server, patient).await;
    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    // Parent insert and children insert both land on the same path; echoing
    // one row back per call is enough for the handler contract.
    Mock::given(method("POST"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-01-01T09:00:00Z",
            "2024-01-01T09:30:00Z"
        )])))
        .mount(&server)
        .await;

    let request = CreateRecurringRequest {
        patient_id: patient,
        title: "Weekly physio".to_string(),
        description: None,
        start_time: utc(2024, 1, 1, 9, 0),
        end_time: utc(2024, 1, 1, 9, 30),
        status: AppointmentStatus::Scheduled,
        frequency: Frequency::Weekly,
        interval: 1,
        weekdays: vec![1],
        end_type: RecurrenceEndType::Count,
        count: Some(3),
        until: None,
        confirm_conflicts: false,
    };

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let response = create_recurring_appointment(
        State(state),
        bearer(),
        clinic_user(clinic),
        Json(request),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["parent"].is_object());
}

#[tokio::test]
async fn reschedule_handler_moves_the_appointment() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();
    let patient = Uuid::new_v4();
    let row = appointment_row(clinic, patient, "2024-05-06T09:00:00Z", "2024-05-06T09:30:00Z");
    let id: Uuid = serde_json::from_value(row["id"].clone()).unwrap();

    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-05-07T10:00:00Z",
            "2024-05-07T10:30:00Z"
        )])))
        .mount(&server)
        .await;

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let response = reschedule_appointment(
        State(state),
        bearer(),
        clinic_user(clinic),
        Path(id),
        Json(RescheduleAppointmentRequest {
            new_start_time: utc(2024, 5, 7, 10, 0),
            new_end_time: utc(2024, 5, 7, 10, 30),
            confirm_conflicts: false,
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn conflict_probe_reports_an_empty_calendar() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let Json(body) = check_conflicts(
        State(state),
        bearer(),
        clinic_user(clinic),
        Query(ConflictCheckQuery {
            start_time: utc(2024, 5, 6, 9, 0),
            end_time: utc(2024, 5, 6, 9, 30),
            exclude_appointment_id: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(body["has_conflicts"], json!(false));
}

#[tokio::test]
async fn calendar_view_projects_the_clinic_calendar() {
    let server = MockServer::start().await;
    let clinic = Uuid::new_v4();
    let patient = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(url_path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(
            clinic,
            patient,
            "2024-05-06T09:00:00Z",
            "2024-05-06T09:30:00Z"
        )])))
        .mount(&server)
        .await;

    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let Json(body) = calendar_view(
        State(state),
        bearer(),
        clinic_user(clinic),
        Query(CalendarQuery {
            view: None,
            date: Some(chrono::NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(body["calendar"]["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn a_user_without_clinic_context_is_rejected() {
    let server = MockServer::start().await;
    let state = TestConfig::with_supabase_url(&server.uri()).to_arc();

    let result = create_appointment(
        State(state),
        bearer(),
        Extension(User {
            id: "not-a-clinic".to_string(),
            email: None,
            role: None,
            metadata: None,
            created_at: None,
        }),
        Json(create_request(Uuid::new_v4(), false)),
    )
    .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}
