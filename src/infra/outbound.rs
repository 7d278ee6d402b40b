//! Log-backed outbound collaborators. Real email and payout channels plug in
//! behind the same ports.

use crate::domain::{
    error::EscrowError,
    notification::Notification,
    payout::PayoutInstruction,
    ports::{BoxFuture, NotificationDispatcher, PayoutGateway},
};

pub struct TracingNotifier;

impl NotificationDispatcher for TracingNotifier {
    fn dispatch<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            tracing::info!(
                user_id = %notification.user_id,
                kind = %notification.kind,
                payload = %notification.payload,
                "notification dispatched"
            );
            Ok(())
        })
    }
}

pub struct TracingPayoutGateway;

impl PayoutGateway for TracingPayoutGateway {
    fn execute<'a>(
        &'a self,
        instruction: &'a PayoutInstruction,
    ) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            tracing::info!(
                idempotency_key = %instruction.idempotency_key(),
                recipient = %instruction.recipient,
                amount = %instruction.money.amount(),
                currency = %instruction.money.currency(),
                "payout requested"
            );
            Ok(())
        })
    }
}
