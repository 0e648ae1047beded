//! Read-only views of the workshop entities that quotations and invoices hang off.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A customer's request for work on a bike at a given store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub store_id: Uuid,
}

/// Progress of the staff-side record of work performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRecordStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRecordStatus::Pending => "pending",
            ServiceRecordStatus::InProgress => "in_progress",
            ServiceRecordStatus::Completed => "completed",
            ServiceRecordStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "in_progress" => ServiceRecordStatus::InProgress,
            "completed" => ServiceRecordStatus::Completed,
            "cancelled" => ServiceRecordStatus::Cancelled,
            _ => ServiceRecordStatus::Pending,
        }
    }
}

/// Work performed against a service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub status: ServiceRecordStatus,
}

impl ServiceRecord {
    pub fn is_completed(&self) -> bool {
        self.status == ServiceRecordStatus::Completed
    }
}
