use {
    super::audit::NewAuditEntry,
    super::error::EscrowError,
    super::escrow::{Escrow, EscrowStatus},
    super::id::{EscrowId, PaymentId, UserId},
    super::notification::Notification,
    super::payment::{Payment, PaymentStatus, ProviderUpdate, TransactionRecord},
    super::payout::PayoutInstruction,
    std::{future::Future, pin::Pin},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a compare-and-set on a status column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cas<T> {
    /// The stored status matched the expected one and the row was updated.
    Applied(T),
    /// The row exists but its status no longer matches; carries the current row.
    Conflict(T),
    Missing,
}

pub trait PaymentRepository: Send + Sync {
    fn find<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<Payment>, EscrowError>>;

    fn find_by_provider_id<'a>(
        &'a self,
        provider_payment_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Payment>, EscrowError>>;

    /// Fails with `Validation` when the id is already taken.
    fn insert<'a>(&'a self, payment: &'a Payment) -> BoxFuture<'a, Result<(), EscrowError>>;

    /// Apply `update` only if the stored status still equals `expected`.
    fn transition<'a>(
        &'a self,
        id: &'a PaymentId,
        expected: PaymentStatus,
        update: &'a ProviderUpdate,
    ) -> BoxFuture<'a, Result<Cas<Payment>, EscrowError>>;

    /// Insert-if-absent keyed on `payment_id`. Returns `true` if inserted.
    fn record_transaction<'a>(
        &'a self,
        record: &'a TransactionRecord,
    ) -> BoxFuture<'a, Result<bool, EscrowError>>;
}

pub trait EscrowRepository: Send + Sync {
    fn find<'a>(&'a self, id: &'a EscrowId) -> BoxFuture<'a, Result<Option<Escrow>, EscrowError>>;

    fn find_by_payment<'a>(
        &'a self,
        payment_id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<Escrow>, EscrowError>>;

    /// Fails with `DuplicateEscrow` when an escrow already references the payment.
    fn insert<'a>(&'a self, escrow: &'a Escrow) -> BoxFuture<'a, Result<(), EscrowError>>;

    fn transition<'a>(
        &'a self,
        id: &'a EscrowId,
        expected: EscrowStatus,
        next: EscrowStatus,
    ) -> BoxFuture<'a, Result<Cas<Escrow>, EscrowError>>;

    /// Escrows where the user is buyer or seller, newest first.
    fn list_for_user<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Vec<Escrow>, EscrowError>>;
}

pub trait AuditLogger: Send + Sync {
    fn record<'a>(&'a self, entry: &'a NewAuditEntry) -> BoxFuture<'a, Result<(), EscrowError>>;
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), EscrowError>>;
}

/// External payout collaborator that moves held funds.
pub trait PayoutGateway: Send + Sync {
    fn execute<'a>(
        &'a self,
        instruction: &'a PayoutInstruction,
    ) -> BoxFuture<'a, Result<(), EscrowError>>;
}
