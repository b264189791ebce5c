// libs/scheduling-cell/src/storage.rs
//
// Boundary contracts for persistence and patient lookup, plus their Supabase
// implementations. Services hold these as trait objects so the scheduling
// logic runs against an in-memory double in tests.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, NewAppointmentRecord, SchedulingError};

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_appointments(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn get_appointment(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, SchedulingError>;

    async fn insert_appointment(
        &self,
        record: &NewAppointmentRecord,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError>;

    async fn insert_many(
        &self,
        records: &[NewAppointmentRecord],
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn update_appointment_time(
        &self,
        appointment_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError>;

    async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), SchedulingError>;
}

/// Resolves patient ids to display names for conflict warnings. Name
/// resolution is presentation-only; conflict detection itself never needs it.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn display_name(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<String>, SchedulingError>;
}

// ==============================================================================
// SUPABASE IMPLEMENTATIONS
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn parse_row(row: Value) -> Result<Appointment, SchedulingError> {
        serde_json::from_value(row).map_err(|e| {
            SchedulingError::Persistence(format!("failed to parse appointment row: {}", e))
        })
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, SchedulingError> {
        rows.into_iter().map(Self::parse_row).collect()
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn list_appointments(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&order=start_time.asc",
            clinic_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        Self::parse_rows(rows)
    }

    async fn get_appointment(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&clinic_id=eq.{}",
            appointment_id, clinic_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        rows.into_iter().next().map(Self::parse_row).transpose()
    }

    async fn insert_appointment(
        &self,
        record: &NewAppointmentRecord,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Inserting appointment for clinic {}", record.clinic_id);

        let body = serde_json::to_value(record)
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        let row = rows.into_iter().next().ok_or_else(|| {
            SchedulingError::Persistence("appointment insert returned no rows".to_string())
        })?;
        Self::parse_row(row)
    }

    async fn insert_many(
        &self,
        records: &[NewAppointmentRecord],
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Inserting {} appointments", records.len());

        let body = serde_json::to_value(records)
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        Self::parse_rows(rows)
    }

    async fn update_appointment_time(
        &self,
        appointment_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or(SchedulingError::AppointmentNotFound)?;
        Self::parse_row(row)
    }

    async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let _rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        Ok(())
    }
}

pub struct SupabasePatientDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePatientDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn display_name(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<String>, SchedulingError> {
        let path = format!(
            "/rest/v1/patients?id=eq.{}&clinic_id=eq.{}&select=id,full_name",
            patient_id, clinic_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Persistence(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row.get("full_name"))
            .and_then(|name| name.as_str())
            .map(String::from))
    }
}
