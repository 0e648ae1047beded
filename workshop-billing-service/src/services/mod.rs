//! Services module for workshop-billing-service.

pub mod clock;
pub mod database;
pub mod expiration;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod quotations;
pub mod repository;

pub use clock::{Clock, SystemClock};
pub use database::Database;
pub use expiration::{refresh_overdue_invoices, run_expiration_sweep, SweepReport};
pub use invoices::InvoiceService;
pub use memory::InMemoryRepository;
pub use metrics::{get_metrics, init_metrics};
pub use quotations::QuotationService;
pub use repository::{DocumentRepository, DuplicateNumber, StaleVersion};
