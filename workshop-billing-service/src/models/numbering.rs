//! Human-facing document numbers: `QUO-YYYYMMDD-NNNNNN` / `INV-YYYYMMDD-NNNNNN`.
//!
//! The suffix is the millisecond clock plus a process-wide sequence, modulo one
//! million. Uniqueness across processes is enforced by the storage unique index;
//! callers regenerate on collision.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Quotation,
    Invoice,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Quotation => "QUO",
            DocumentKind::Invoice => "INV",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Quotation => "quotation",
            DocumentKind::Invoice => "invoice",
        }
    }
}

pub fn generate_number(kind: DocumentKind, now: DateTime<Utc>) -> String {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix = now
        .timestamp_millis()
        .unsigned_abs()
        .wrapping_add(sequence)
        % 1_000_000;

    format!("{}-{}-{:06}", kind.prefix(), now.format("%Y%m%d"), suffix)
}
