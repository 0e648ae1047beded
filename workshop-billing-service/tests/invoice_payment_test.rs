//! Invoice creation and payment integration tests for workshop-billing-service.

mod common;

use chrono::Duration;
use common::{item, staff_of, TestApp};
use rust_decimal_macros::dec;
use service_core::error::AppError;
use uuid::Uuid;
use workshop_billing_service::models::{
    Actor, Capability, InvoiceFilter, NewInvoice, NewPayment, Pagination, PaymentStatus,
};

fn payment(amount: rust_decimal::Decimal) -> NewPayment {
    NewPayment {
        amount,
        paid_at: None,
        notes: None,
    }
}

/// Invoice with total 54.25 (50.00 + 8.5% tax).
async fn invoice_for_54_25(app: &TestApp) -> workshop_billing_service::models::Invoice {
    app.complete_work().await;
    app.invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                line_items: Some(vec![item("Drivetrain clean", dec!(1), dec!(50.00))]),
                tax_rate: Some(dec!(8.5)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn invoice_requires_completed_service_record() {
    let app = TestApp::spawn().await;
    let input = NewInvoice {
        service_record_id: app.fixture.record.id,
        line_items: Some(vec![item("Labour", dec!(1), dec!(40))]),
        ..Default::default()
    };

    let result = app.invoices().create(&app.fixture.staff, input.clone()).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let missing = NewInvoice {
        service_record_id: Uuid::new_v4(),
        ..input.clone()
    };
    let result = app.invoices().create(&app.fixture.staff, missing).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    app.complete_work().await;
    let invoice = app.invoices().create(&app.fixture.staff, input).await.unwrap();
    assert_eq!(invoice.payment_status(), PaymentStatus::Pending);
    assert_eq!(invoice.due_date(), app.now() + Duration::days(30));
    assert!(invoice.invoice_number().starts_with("INV-20260302-"));
}

#[tokio::test]
async fn invoice_requires_invoice_capability() {
    let app = TestApp::spawn().await;
    app.complete_work().await;
    let input = NewInvoice {
        service_record_id: app.fixture.record.id,
        line_items: Some(vec![item("Labour", dec!(1), dec!(40))]),
        ..Default::default()
    };

    let quoter = Actor::staff(
        Uuid::new_v4(),
        app.fixture.store_id,
        vec![Capability::CreateQuotations],
    );
    let result = app.invoices().create(&quoter, input.clone()).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let result = app.invoices().create(&staff_of(Uuid::new_v4()), input).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn partial_then_full_payment() {
    let app = TestApp::spawn().await;
    let invoice = invoice_for_54_25(&app).await;
    assert_eq!(invoice.total(), dec!(54.25));

    let (invoice, first) = app
        .invoices()
        .record_payment(&app.fixture.staff, invoice.id, payment(dec!(25.00)))
        .await
        .unwrap();
    assert_eq!(first.amount, dec!(25.00));
    assert_eq!(invoice.paid_amount(), dec!(25.00));
    assert_eq!(invoice.payment_status(), PaymentStatus::Partial);
    assert!(invoice.paid_date().is_none());

    let result = app
        .invoices()
        .record_payment(&app.fixture.staff, invoice.id, payment(dec!(30.00)))
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let unchanged = app
        .invoices()
        .get(&app.fixture.staff, invoice.id)
        .await
        .unwrap();
    assert_eq!(unchanged.paid_amount(), dec!(25.00));

    app.clock.advance(Duration::hours(3));
    let (invoice, _) = app
        .invoices()
        .record_payment(&app.fixture.staff, invoice.id, payment(dec!(29.25)))
        .await
        .unwrap();
    assert_eq!(invoice.payment_status(), PaymentStatus::Paid);
    assert_eq!(invoice.paid_date(), Some(app.now()));
    assert_eq!(invoice.balance_due(), dec!(0));
    assert_eq!(invoice.payments().len(), 2);

    let result = app
        .invoices()
        .record_payment(&app.fixture.staff, invoice.id, payment(dec!(1.00)))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn overdue_is_reported_without_a_sweep_and_partial_wins() {
    let app = TestApp::spawn().await;
    let invoice = invoice_for_54_25(&app).await;

    app.clock.advance(Duration::days(31));
    let fetched = app
        .invoices()
        .get(&app.fixture.customer, invoice.id)
        .await
        .unwrap();
    assert_eq!(fetched.current_status(app.now()), PaymentStatus::Overdue);

    let (invoice, _) = app
        .invoices()
        .record_payment(&app.fixture.staff, invoice.id, payment(dec!(10.00)))
        .await
        .unwrap();
    assert_eq!(invoice.payment_status(), PaymentStatus::Partial);
    assert_eq!(invoice.current_status(app.now()), PaymentStatus::Partial);
}

#[tokio::test]
async fn invoice_from_approved_quotation_copies_pricing() {
    let app = TestApp::spawn().await;
    let quotation = app
        .approved_quotation(
            vec![
                item("Wheel truing", dec!(2), dec!(25.00)),
                item("Brake bleed", dec!(2), dec!(50.00)),
            ],
            dec!(8.5),
        )
        .await;
    app.complete_work().await;

    let input = NewInvoice {
        service_record_id: app.fixture.record.id,
        quotation_id: Some(quotation.id),
        due_days: Some(14),
        ..Default::default()
    };
    let invoice = app
        .invoices()
        .create(&app.fixture.staff, input.clone())
        .await
        .unwrap();
    assert_eq!(invoice.quotation_id, Some(quotation.id));
    assert_eq!(invoice.line_items().len(), 2);
    assert_eq!(invoice.total(), dec!(162.75));
    assert_eq!(invoice.due_date(), app.now() + Duration::days(14));

    let again = app.invoices().create(&app.fixture.staff, input).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn quotation_must_be_approved_to_invoice() {
    let app = TestApp::spawn().await;
    let quotation = app
        .draft_quotation(vec![item("Overhaul", dec!(1), dec!(120))], dec!(0))
        .await;
    app.complete_work().await;

    let result = app
        .invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                quotation_id: Some(quotation.id),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let result = app
        .invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                quotation_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = app
        .invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn due_days_are_bounded() {
    let app = TestApp::spawn().await;
    app.complete_work().await;

    let result = app
        .invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                line_items: Some(vec![item("Labour", dec!(1), dec!(40))]),
                due_days: Some(366),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn zero_total_invoice_is_paid_on_creation() {
    let app = TestApp::spawn().await;
    app.complete_work().await;

    let invoice = app
        .invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                line_items: Some(vec![item("Warranty repair", dec!(1), dec!(0))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(invoice.payment_status(), PaymentStatus::Paid);
    assert_eq!(invoice.paid_date(), Some(app.now()));
}

#[tokio::test]
async fn cancel_only_without_payments() {
    let app = TestApp::spawn().await;
    let invoice = invoice_for_54_25(&app).await;

    app.invoices()
        .record_payment(&app.fixture.staff, invoice.id, payment(dec!(5.00)))
        .await
        .unwrap();
    let result = app.invoices().cancel(&app.fixture.staff, invoice.id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let second = app
        .invoices()
        .create(
            &app.fixture.staff,
            NewInvoice {
                service_record_id: app.fixture.record.id,
                line_items: Some(vec![item("Labour", dec!(1), dec!(40))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let cancelled = app
        .invoices()
        .cancel(&app.fixture.staff, second.id)
        .await
        .unwrap();
    assert_eq!(cancelled.payment_status(), PaymentStatus::Cancelled);

    let result = app
        .invoices()
        .record_payment(&app.fixture.staff, second.id, payment(dec!(1.00)))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let stats = app
        .invoices()
        .stats(&app.fixture.staff, Some(app.fixture.store_id))
        .await
        .unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_status.get("partial"), Some(&1));
    assert_eq!(stats.by_status.get("cancelled"), Some(&1));
    assert_eq!(stats.total_invoiced, dec!(54.25));
    assert_eq!(stats.total_paid, dec!(5.00));
    assert_eq!(stats.total_outstanding, dec!(49.25));
}

#[tokio::test]
async fn customers_only_see_their_own_invoices() {
    let app = TestApp::spawn().await;
    let invoice = invoice_for_54_25(&app).await;

    let stranger = Actor::customer(Uuid::new_v4());
    let result = app.invoices().get(&stranger, invoice.id).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let page = app
        .invoices()
        .list(
            &app.fixture.customer,
            InvoiceFilter {
                payment_status: Some(PaymentStatus::Pending),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, invoice.id);
}
