mod common;

use common::*;
use escrow_sync::domain::escrow::EscrowStatus;
use escrow_sync::domain::money::MoneyAmount;
use escrow_sync::domain::payment::PaymentStatus;
use escrow_sync::services::signature;
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Completed),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Refunded),
    ]
}

fn arb_escrow_status() -> impl Strategy<Value = EscrowStatus> {
    prop_oneof![
        Just(EscrowStatus::Active),
        Just(EscrowStatus::Released),
        Just(EscrowStatus::Cancelled),
    ]
}

fn arb_provider_status() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("COMPLETE"),
        Just("FAILED"),
        Just("CANCELLED"),
        Just("REFUNDED"),
        Just("PENDING"),
    ]
}

proptest! {
    /// Only pending→completed, pending→failed and completed→refunded are legal.
    #[test]
    fn payment_transitions_are_exactly_the_allowed_edges(
        from in arb_status(),
        to in arb_status(),
    ) {
        use PaymentStatus::*;
        let allowed = matches!(
            (from, to),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        );
        prop_assert_eq!(from.can_transition_to(&to), allowed);
    }

    /// A random walk never leaves a terminal state and takes at most two steps.
    #[test]
    fn payment_random_walk_is_bounded(
        steps in prop::collection::vec(arb_status(), 1..20)
    ) {
        let mut current = PaymentStatus::Pending;
        let mut transitions = 0u32;
        for next in &steps {
            if current.can_transition_to(next) {
                current = *next;
                transitions += 1;
            }
        }
        prop_assert!(transitions <= 2, "got {transitions} transitions in walk: {steps:?}");
    }

    #[test]
    fn released_and_cancelled_are_terminal(target in arb_escrow_status()) {
        prop_assert!(!EscrowStatus::Released.can_transition_to(&target));
        prop_assert!(!EscrowStatus::Cancelled.can_transition_to(&target));
    }

    /// Flipping any one hex digit of a valid signature fails verification.
    #[test]
    fn single_character_tamper_is_rejected(
        payment_id in "[A-Z][A-Z0-9]{0,15}",
        amount in 1u32..10_000_000,
        index in 0usize..64,
        replacement in "[0-9a-f]",
    ) {
        let amount = format!("{}.{:02}", amount / 100, amount % 100);
        let mut fields = fields(&[
            ("m_payment_id", payment_id.as_str()),
            ("payment_status", "COMPLETE"),
            ("amount_gross", amount.as_str()),
        ]);
        let good = signature::sign(&fields, SECRET);
        prop_assert!(signature::verify(&fields, &good, SECRET));

        let mut chars: Vec<char> = good.chars().collect();
        let replacement = replacement.chars().next().unwrap();
        prop_assume!(chars[index] != replacement);
        chars[index] = replacement;
        let tampered: String = chars.into_iter().collect();

        fields.insert("signature".into(), tampered.clone());
        prop_assert!(!signature::verify(&fields, &tampered, SECRET));
    }

    #[test]
    fn decimal_amounts_parse_to_minor_units(cents in 0i64..1_000_000_000) {
        let text = format!("{}.{:02}", cents / 100, cents % 100);
        prop_assert_eq!(MoneyAmount::parse_decimal(&text).unwrap().cents(), cents);
    }
}

// Any sequence of signed deliveries leaves the payment on a legal path from pending,
// with exactly one notification per applied transition.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn delivery_sequences_follow_state_machine(
        statuses in prop::collection::vec(arb_provider_status(), 1..8)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = Harness::new();
            h.seed_payment("P1", "B", 1000).await;

            let mut expected = PaymentStatus::Pending;
            let mut applied = 0usize;
            for &status in &statuses {
                let target = match status {
                    "COMPLETE" => PaymentStatus::Completed,
                    "REFUNDED" => PaymentStatus::Refunded,
                    _ => PaymentStatus::Failed,
                };
                h.deliver(&[("m_payment_id", "P1"), ("payment_status", status)])
                    .await
                    .unwrap();
                if expected.can_transition_to(&target) {
                    expected = target;
                    applied += 1;
                }
            }

            assert_eq!(h.payment("P1").await.status, expected);
            assert_eq!(h.notifier.sent().len(), applied);
            assert_eq!(h.audit.entries().len(), applied);
        });
    }
}
