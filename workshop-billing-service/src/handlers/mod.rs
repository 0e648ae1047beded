//! HTTP handlers for workshop-billing-service.

pub mod health;
pub mod invoices;
pub mod quotations;

use crate::models::{Pagination, DEFAULT_PER_PAGE};

pub(crate) fn pagination(page: Option<u32>, per_page: Option<u32>) -> Pagination {
    Pagination {
        page: page.unwrap_or(1),
        per_page: per_page.unwrap_or(DEFAULT_PER_PAGE),
    }
    .normalize()
}
