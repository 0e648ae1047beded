//! Common test utilities for workshop-billing-service integration tests.
//!
//! Everything runs against `InMemoryRepository` and a manually advanced clock,
//! so no database is needed.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use service_core::config::Config;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use workshop_billing_service::config::{BillingConfig, StorageBackend, WorkshopConfig};
use workshop_billing_service::models::{
    Actor, Capability, NewLineItem, NewQuotation, Quotation, Role, ServiceRecord,
    ServiceRecordStatus, ServiceRequest,
};
use workshop_billing_service::services::{
    Clock, DocumentRepository, InMemoryRepository, InvoiceService, QuotationService,
};
use workshop_billing_service::startup::{build_router, AppState};

/// Clock whose time only moves when a test says so.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.0.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn test_config() -> WorkshopConfig {
    WorkshopConfig {
        common: Config::default(),
        service_name: "workshop-billing-service".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        storage: StorageBackend::Memory,
        database: None,
        billing: BillingConfig::default(),
    }
}

/// A store with one staff member, one customer and a service request.
pub struct Fixture {
    pub store_id: Uuid,
    pub staff: Actor,
    pub customer: Actor,
    pub request: ServiceRequest,
    pub record: ServiceRecord,
}

pub struct TestApp {
    pub repo: Arc<InMemoryRepository>,
    pub clock: Arc<ManualClock>,
    pub state: AppState,
    pub fixture: Fixture,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let dyn_repo: Arc<dyn DocumentRepository> = repo.clone();
        let state = AppState::new(test_config(), dyn_repo, clock.clone());

        let store_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let request = ServiceRequest {
            id: Uuid::new_v4(),
            customer_id,
            store_id,
        };
        let record = ServiceRecord {
            id: Uuid::new_v4(),
            service_request_id: request.id,
            status: ServiceRecordStatus::InProgress,
        };
        repo.insert_service_request(request.clone()).await;
        repo.insert_service_record(record.clone()).await;

        let fixture = Fixture {
            store_id,
            staff: staff_of(store_id),
            customer: Actor::customer(customer_id),
            request,
            record,
        };

        Self {
            repo,
            clock,
            state,
            fixture,
        }
    }

    pub fn quotations(&self) -> &QuotationService {
        &self.state.quotations
    }

    pub fn invoices(&self) -> &InvoiceService {
        &self.state.invoices
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn complete_work(&self) {
        self.repo
            .set_service_record_status(self.fixture.record.id, ServiceRecordStatus::Completed)
            .await;
    }

    /// Draft quotation for the fixture request, valid for `valid_days`.
    pub fn new_quotation(&self, items: Vec<NewLineItem>, tax_rate: Decimal, valid_days: i64) -> NewQuotation {
        NewQuotation {
            service_request_id: self.fixture.request.id,
            line_items: items,
            tax_rate,
            valid_until: self.now() + Duration::days(valid_days),
            notes: None,
        }
    }

    pub async fn draft_quotation(&self, items: Vec<NewLineItem>, tax_rate: Decimal) -> Quotation {
        let input = self.new_quotation(items, tax_rate, 14);
        self.quotations()
            .create(&self.fixture.staff, input)
            .await
            .expect("Failed to create quotation")
    }

    /// Create, send and approve a quotation.
    pub async fn approved_quotation(&self, items: Vec<NewLineItem>, tax_rate: Decimal) -> Quotation {
        let quotation = self.draft_quotation(items, tax_rate).await;
        self.quotations()
            .send(&self.fixture.staff, quotation.id)
            .await
            .expect("Failed to send quotation");
        self.quotations()
            .approve(&self.fixture.customer, quotation.id)
            .await
            .expect("Failed to approve quotation")
    }
}

pub fn item(description: &str, quantity: Decimal, unit_price: Decimal) -> NewLineItem {
    NewLineItem {
        description: description.to_string(),
        quantity,
        unit_price,
    }
}

pub fn staff_of(store_id: Uuid) -> Actor {
    Actor::staff(
        Uuid::new_v4(),
        store_id,
        vec![Capability::CreateQuotations, Capability::CreateInvoices],
    )
}

pub fn admin() -> Actor {
    Actor {
        actor_id: Uuid::new_v4(),
        role: Role::Admin,
        store_permissions: Vec::new(),
    }
}
