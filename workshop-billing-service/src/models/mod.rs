//! Domain models for workshop-billing-service.

mod actor;
mod invoice;
mod line_item;
mod numbering;
mod pagination;
mod pricing;
mod quotation;
mod stats;
mod workshop;

pub use actor::{parse_store_permissions, Actor, Capability, Role, StorePermission};
pub use invoice::{
    payment_status, validate_due_days, Invoice, InvoiceFilter, InvoiceParts, InvoiceRow,
    NewInvoice, NewPayment, Payment, PaymentStatus, MAX_DUE_DAYS,
};
pub use line_item::{
    line_total, round2, LineItem, LineItemChanges, NewLineItem, MAX_AMOUNT, MAX_QUANTITY,
    MAX_UNIT_PRICE,
};
pub use numbering::{generate_number, DocumentKind};
pub use pagination::{Page, Pagination, DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use pricing::{compute_totals, validate_tax_rate, Pricing, Totals};
pub use quotation::{
    NewQuotation, Quotation, QuotationFilter, QuotationRow, QuotationStatus, QuotationTerms,
};
pub use stats::{InvoiceStats, QuotationStats, StatusTally};
pub use workshop::{ServiceRecord, ServiceRecordStatus, ServiceRequest};
