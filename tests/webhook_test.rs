mod common;

use common::*;
use escrow_sync::domain::error::EscrowError;
use escrow_sync::domain::escrow::EscrowStatus;
use escrow_sync::domain::notification::NotificationKind;
use escrow_sync::domain::payment::PaymentStatus;
use escrow_sync::domain::webhook::{PendingPolicy, ReconcileOutcome};

const P1_COMPLETE: [(&str, &str); 4] = [
    ("m_payment_id", "P1"),
    ("pf_payment_id", "1089250"),
    ("payment_status", "COMPLETE"),
    ("amount_gross", "1000.00"),
];

// ── 1. complete_then_identical_redelivery ─────────────────────────────────

#[tokio::test]
async fn complete_then_identical_redelivery() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    let first = h.deliver(&P1_COMPLETE).await.unwrap();
    assert_eq!(
        first,
        ReconcileOutcome::Applied {
            payment_id: pid("P1"),
            from: PaymentStatus::Pending,
            to: PaymentStatus::Completed,
        }
    );

    let p = h.payment("P1").await;
    assert_eq!(p.status, PaymentStatus::Completed);
    assert_eq!(p.provider_payment_id.as_deref(), Some("1089250"));
    assert!(p.provider_signature.is_some());
    assert!(p.raw_provider_response.as_deref().unwrap().contains("m_payment_id=P1"));

    let second = h.deliver(&P1_COMPLETE).await.unwrap();
    assert_eq!(second, ReconcileOutcome::Duplicate(pid("P1")));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Completed);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1, "redelivery must not notify again");
    assert_eq!(sent[0].kind, NotificationKind::PaymentConfirmed);
    assert_eq!(sent[0].user_id, uid("B"));
    assert_eq!(h.audit.entries().len(), 1);
    assert_eq!(h.payments.transactions().len(), 1);
}

// ── 2. n_deliveries_equal_one ─────────────────────────────────────────────

#[tokio::test]
async fn n_deliveries_equal_one() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    for _ in 0..5 {
        h.deliver(&P1_COMPLETE).await.unwrap();
    }

    assert_eq!(h.payment("P1").await.status, PaymentStatus::Completed);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.audit.entries().len(), 1);
    assert_eq!(h.payments.transactions().len(), 1);
}

// ── 3. audit_entry_records_delivery_context ───────────────────────────────

#[tokio::test]
async fn audit_entry_records_delivery_context() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;
    h.deliver(&P1_COMPLETE).await.unwrap();

    let entries = h.audit.entries();
    let entry = &entries[0];
    assert_eq!(entry.entity_type, "payment");
    assert_eq!(entry.entity_id, "P1");
    assert_eq!(entry.actor, "webhook:payfast");
    assert_eq!(entry.detail["old_status"], "pending");
    assert_eq!(entry.detail["new_status"], "completed");
    assert_eq!(entry.detail["provider"], "payfast");
    assert_eq!(entry.detail["source_ip"], "41.74.179.194");
    assert_eq!(entry.detail["user_agent"], "PayFast ITN");
}

// ── 4. tampered_signature_rejected_without_mutation ───────────────────────

#[tokio::test]
async fn tampered_signature_rejected_without_mutation() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    let mut fields = signed(&P1_COMPLETE);
    let sig = fields.get_mut("signature").unwrap();
    let flipped = if sig.ends_with('0') { '1' } else { '0' };
    sig.pop();
    sig.push(flipped);

    let err = h.deliver_fields(fields).await.unwrap_err();
    assert!(matches!(err, EscrowError::Signature(_)));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Pending);
    assert!(h.notifier.sent().is_empty());
    assert!(h.audit.entries().is_empty());
}

#[tokio::test]
async fn tampered_field_rejected() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    let mut fields = signed(&P1_COMPLETE);
    fields.insert("amount_gross".into(), "1.00".into());

    let err = h.deliver_fields(fields).await.unwrap_err();
    assert!(matches!(err, EscrowError::Signature(_)));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn missing_status_fails_closed() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    let err = h.deliver(&[("m_payment_id", "P1")]).await.unwrap_err();
    assert!(matches!(err, EscrowError::Signature(_)));
}

// ── 5. unknown_payment_is_not_found_and_audited ───────────────────────────

#[tokio::test]
async fn unknown_payment_is_not_found_and_audited() {
    let h = Harness::new();

    let err = h
        .deliver(&[("m_payment_id", "GHOST"), ("payment_status", "COMPLETE")])
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::NotFound(_)));

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "webhook_unknown_payment");
    assert_eq!(entries[0].entity_id, "GHOST");
    assert!(h.notifier.sent().is_empty());
}

// ── 6. out_of_order_failed_after_completed ────────────────────────────────

#[tokio::test]
async fn out_of_order_failed_after_completed() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;
    h.deliver(&P1_COMPLETE).await.unwrap();

    let late = h
        .deliver(&[
            ("m_payment_id", "P1"),
            ("pf_payment_id", "1089250"),
            ("payment_status", "FAILED"),
        ])
        .await
        .unwrap();
    assert_eq!(
        late,
        ReconcileOutcome::Rejected {
            payment_id: pid("P1"),
            current: PaymentStatus::Completed,
            attempted: PaymentStatus::Failed,
        }
    );

    let p = h.payment("P1").await;
    assert_eq!(p.status, PaymentStatus::Completed);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.audit.entries().len(), 1);
}

// ── 7. refund_only_from_completed ─────────────────────────────────────────

#[tokio::test]
async fn refund_of_pending_payment_is_rejected() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    let outcome = h
        .deliver(&[("m_payment_id", "P1"), ("payment_status", "REFUNDED")])
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Rejected { .. }));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn refund_after_completion_by_provider_id() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;
    h.deliver(&P1_COMPLETE).await.unwrap();

    // Only the provider's id is echoed on the refund callback.
    let outcome = h
        .deliver(&[("pf_payment_id", "1089250"), ("payment_status", "REFUNDED")])
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            payment_id: pid("P1"),
            from: PaymentStatus::Completed,
            to: PaymentStatus::Refunded,
        }
    );

    let kinds: Vec<_> = h.notifier.sent().into_iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::PaymentConfirmed, NotificationKind::RefundIssued]
    );
}

// ── 8. failed_payment_notifies_once ───────────────────────────────────────

#[tokio::test]
async fn failed_payment_notifies_once() {
    let h = Harness::new();
    h.seed_payment("P2", "B", 5_000).await;

    let outcome = h
        .deliver(&[("m_payment_id", "P2"), ("payment_status", "CANCELLED")])
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Applied { to: PaymentStatus::Failed, .. }
    ));
    assert_eq!(h.notifier.sent()[0].kind, NotificationKind::PaymentFailed);
    assert!(h.payments.transactions().is_empty());
}

// ── 9. pending_status_policy ──────────────────────────────────────────────

#[tokio::test]
async fn pending_maps_to_failed_by_default() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    h.deliver(&[("m_payment_id", "P1"), ("payment_status", "PENDING")])
        .await
        .unwrap();
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn pending_ignored_under_ignore_policy() {
    let h = Harness::with_pending_policy(PendingPolicy::Ignore);
    h.seed_payment("P1", "B", 100_000).await;

    let outcome = h
        .deliver(&[("m_payment_id", "P1"), ("payment_status", "PENDING")])
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Ignored(pid("P1")));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Pending);
    assert!(h.notifier.sent().is_empty());

    h.deliver(&P1_COMPLETE).await.unwrap();
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Completed);
}

// ── 10. amount_mismatch_is_rejected ───────────────────────────────────────

#[tokio::test]
async fn amount_mismatch_is_rejected() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;

    let err = h
        .deliver(&[
            ("m_payment_id", "P1"),
            ("payment_status", "COMPLETE"),
            ("amount_gross", "10.00"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::Validation(_)));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Pending);
}

// ── 11. escrow_intent_opens_escrow_once ───────────────────────────────────

#[tokio::test]
async fn escrow_intent_opens_escrow_once() {
    let h = Harness::new();
    h.seed_payment_with_intent("P1", "B", 100_000, intent("S", 80_000))
        .await;

    h.deliver(&P1_COMPLETE).await.unwrap();
    h.deliver(&P1_COMPLETE).await.unwrap();

    let escrow = h.escrow_for("P1").await.expect("escrow opened");
    assert_eq!(escrow.status, EscrowStatus::Active);
    assert_eq!(escrow.buyer_id, uid("B"));
    assert_eq!(escrow.seller_id, uid("S"));
    assert_eq!(escrow.money.amount().cents(), 80_000);
    assert_eq!(escrow.metadata["milestone"], 1);

    let kinds: Vec<_> = h.notifier.sent().into_iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::PaymentConfirmed, NotificationKind::EscrowCreated]
    );
}

#[tokio::test]
async fn oversized_escrow_intent_leaves_payment_completed() {
    let h = Harness::new();
    h.seed_payment_with_intent("P1", "B", 100_000, intent("S", 200_000))
        .await;

    let outcome = h.deliver(&P1_COMPLETE).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Completed);
    assert!(h.escrow_for("P1").await.is_none());
}

// ── 12. audit_failure_does_not_fail_webhook ───────────────────────────────

#[tokio::test]
async fn audit_failure_does_not_fail_webhook() {
    let h = Harness::new();
    h.seed_payment("P1", "B", 100_000).await;
    h.audit.fail_next(1);
    h.notifier.fail_next(1);

    let outcome = h.deliver(&P1_COMPLETE).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
    assert_eq!(h.payment("P1").await.status, PaymentStatus::Completed);
    assert_eq!(h.payments.transactions().len(), 1);
}
