// Shared fixtures for the scheduling-cell test suites: an in-memory double
// of the storage traits and a handful of builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use scheduling_cell::models::{
    Appointment, AppointmentDraft, AppointmentStatus, NewAppointmentRecord, RecurrenceLink,
    SchedulingError,
};
use scheduling_cell::storage::{AppointmentStore, PatientDirectory};

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

pub fn appointment_at(
    clinic_id: Uuid,
    patient_id: Uuid,
    title: &str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        clinic_id,
        patient_id,
        title: title.to_string(),
        description: None,
        start_time,
        end_time,
        status: AppointmentStatus::Scheduled,
        recurrence: RecurrenceLink::Standalone,
        created_at: start_time,
        updated_at: start_time,
    }
}

pub fn draft(
    patient_id: Uuid,
    title: &str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> AppointmentDraft {
    AppointmentDraft {
        patient_id,
        title: title.to_string(),
        description: None,
        start_time,
        end_time,
        status: AppointmentStatus::Scheduled,
    }
}

/// Storage double backed by a Vec. `fail_insert_many` arms a one-shot
/// persistence failure for the rollback tests.
pub struct InMemoryStore {
    appointments: Mutex<Vec<Appointment>>,
    fail_insert_many: AtomicBool,
    deleted: Mutex<Vec<Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Self::with_appointments(Vec::new())
    }

    pub fn with_appointments(appointments: Vec<Appointment>) -> Arc<Self> {
        Arc::new(Self {
            appointments: Mutex::new(appointments),
            fail_insert_many: AtomicBool::new(false),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn arm_insert_many_failure(&self) {
        self.fail_insert_many.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Vec<Appointment> {
        self.appointments.lock().unwrap().clone()
    }

    pub fn deleted_ids(&self) -> Vec<Uuid> {
        self.deleted.lock().unwrap().clone()
    }

    fn materialize(record: &NewAppointmentRecord) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: record.clinic_id,
            patient_id: record.patient_id,
            title: record.title.clone(),
            description: record.description.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
            status: record.status,
            recurrence: record.recurrence.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn list_appointments(
        &self,
        clinic_id: Uuid,
        _auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut rows: Vec<Appointment> = self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|apt| apt.clinic_id == clinic_id)
            .cloned()
            .collect();
        rows.sort_by_key(|apt| apt.start_time);
        Ok(rows)
    }

    async fn get_appointment(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        _auth_token: &str,
    ) -> Result<Option<Appointment>, SchedulingError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .find(|apt| apt.id == appointment_id && apt.clinic_id == clinic_id)
            .cloned())
    }

    async fn insert_appointment(
        &self,
        record: &NewAppointmentRecord,
        _auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = Self::materialize(record);
        self.appointments.lock().unwrap().push(appointment.clone());
        Ok(appointment)
    }

    async fn insert_many(
        &self,
        records: &[NewAppointmentRecord],
        _auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        if self.fail_insert_many.swap(false, Ordering::SeqCst) {
            return Err(SchedulingError::Persistence(
                "bulk insert rejected".to_string(),
            ));
        }
        let appointments: Vec<Appointment> = records.iter().map(Self::materialize).collect();
        self.appointments
            .lock()
            .unwrap()
            .extend(appointments.iter().cloned());
        Ok(appointments)
    }

    async fn update_appointment_time(
        &self,
        appointment_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        _auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointments = self.appointments.lock().unwrap();
        let appointment = appointments
            .iter_mut()
            .find(|apt| apt.id == appointment_id)
            .ok_or(SchedulingError::AppointmentNotFound)?;
        appointment.start_time = start_time;
        appointment.end_time = end_time;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        _auth_token: &str,
    ) -> Result<(), SchedulingError> {
        self.appointments
            .lock()
            .unwrap()
            .retain(|apt| apt.id != appointment_id);
        self.deleted.lock().unwrap().push(appointment_id);
        Ok(())
    }
}

/// Patient lookup double with a fixed name table.
pub struct StaticDirectory {
    names: HashMap<Uuid, String>,
}

impl StaticDirectory {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            names: HashMap::new(),
        })
    }

    pub fn knowing(patients: &[(Uuid, &str)]) -> Arc<Self> {
        Arc::new(Self {
            names: patients
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl PatientDirectory for StaticDirectory {
    async fn display_name(
        &self,
        _clinic_id: Uuid,
        patient_id: Uuid,
        _auth_token: &str,
    ) -> Result<Option<String>, SchedulingError> {
        Ok(self.names.get(&patient_id).cloned())
    }
}
