//! In-process repositories and collaborators.
//!
//! Every compare-and-set runs under one mutex, which gives the same
//! single-statement atomicity as the Postgres `UPDATE ... WHERE status = $n`.

use {
    crate::domain::{
        audit::NewAuditEntry,
        error::EscrowError,
        escrow::{Escrow, EscrowStatus},
        id::{EscrowId, PaymentId, UserId},
        notification::Notification,
        payment::{Payment, PaymentStatus, ProviderUpdate, TransactionRecord},
        payout::PayoutInstruction,
        ports::{
            AuditLogger, BoxFuture, Cas, EscrowRepository, NotificationDispatcher, PaymentRepository,
            PayoutGateway,
        },
    },
    chrono::Utc,
    std::{
        collections::HashMap,
        sync::{
            Mutex, MutexGuard,
            atomic::{AtomicU32, Ordering},
        },
    },
};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, EscrowError> {
    m.lock()
        .map_err(|_| EscrowError::Internal("in-memory store poisoned".into()))
}

#[derive(Default)]
pub struct MemoryPaymentRepository {
    payments: Mutex<HashMap<PaymentId, Payment>>,
    transactions: Mutex<HashMap<PaymentId, TransactionRecord>>,
}

impl MemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions
            .lock()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl PaymentRepository for MemoryPaymentRepository {
    fn find<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<Payment>, EscrowError>> {
        Box::pin(async move { Ok(lock(&self.payments)?.get(id).cloned()) })
    }

    fn find_by_provider_id<'a>(
        &'a self,
        provider_payment_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Payment>, EscrowError>> {
        Box::pin(async move {
            Ok(lock(&self.payments)?
                .values()
                .find(|p| p.provider_payment_id.as_deref() == Some(provider_payment_id))
                .cloned())
        })
    }

    fn insert<'a>(&'a self, payment: &'a Payment) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            let mut payments = lock(&self.payments)?;
            if payments.contains_key(&payment.id) {
                return Err(EscrowError::Validation(format!(
                    "payment {} already exists",
                    payment.id
                )));
            }
            payments.insert(payment.id.clone(), payment.clone());
            Ok(())
        })
    }

    fn transition<'a>(
        &'a self,
        id: &'a PaymentId,
        expected: PaymentStatus,
        update: &'a ProviderUpdate,
    ) -> BoxFuture<'a, Result<Cas<Payment>, EscrowError>> {
        Box::pin(async move {
            let mut payments = lock(&self.payments)?;
            let Some(payment) = payments.get_mut(id) else {
                return Ok(Cas::Missing);
            };
            if payment.status != expected {
                return Ok(Cas::Conflict(payment.clone()));
            }
            payment.apply(update);
            Ok(Cas::Applied(payment.clone()))
        })
    }

    fn record_transaction<'a>(
        &'a self,
        record: &'a TransactionRecord,
    ) -> BoxFuture<'a, Result<bool, EscrowError>> {
        Box::pin(async move {
            let mut transactions = lock(&self.transactions)?;
            if transactions.contains_key(&record.payment_id) {
                return Ok(false);
            }
            transactions.insert(record.payment_id.clone(), record.clone());
            Ok(true)
        })
    }
}

#[derive(Default)]
pub struct MemoryEscrowRepository {
    escrows: Mutex<HashMap<EscrowId, Escrow>>,
}

impl MemoryEscrowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EscrowRepository for MemoryEscrowRepository {
    fn find<'a>(&'a self, id: &'a EscrowId) -> BoxFuture<'a, Result<Option<Escrow>, EscrowError>> {
        Box::pin(async move { Ok(lock(&self.escrows)?.get(id).cloned()) })
    }

    fn find_by_payment<'a>(
        &'a self,
        payment_id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<Escrow>, EscrowError>> {
        Box::pin(async move {
            Ok(lock(&self.escrows)?
                .values()
                .find(|e| &e.payment_id == payment_id)
                .cloned())
        })
    }

    fn insert<'a>(&'a self, escrow: &'a Escrow) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            let mut escrows = lock(&self.escrows)?;
            if escrows.values().any(|e| e.payment_id == escrow.payment_id) {
                return Err(EscrowError::DuplicateEscrow(escrow.payment_id.to_string()));
            }
            escrows.insert(escrow.id, escrow.clone());
            Ok(())
        })
    }

    fn transition<'a>(
        &'a self,
        id: &'a EscrowId,
        expected: EscrowStatus,
        next: EscrowStatus,
    ) -> BoxFuture<'a, Result<Cas<Escrow>, EscrowError>> {
        Box::pin(async move {
            if !expected.can_transition_to(&next) {
                return Err(EscrowError::InvalidTransition(format!("{expected} → {next}")));
            }
            let mut escrows = lock(&self.escrows)?;
            let Some(escrow) = escrows.get_mut(id) else {
                return Ok(Cas::Missing);
            };
            if escrow.status != expected {
                return Ok(Cas::Conflict(escrow.clone()));
            }
            escrow.status = next;
            escrow.updated_at = Utc::now();
            Ok(Cas::Applied(escrow.clone()))
        })
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Vec<Escrow>, EscrowError>> {
        Box::pin(async move {
            let mut found: Vec<Escrow> = lock(&self.escrows)?
                .values()
                .filter(|e| e.is_party(user_id))
                .cloned()
                .collect();
            found.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.id.as_uuid().cmp(&a.id.as_uuid()))
            });
            Ok(found)
        })
    }
}

/// Decrements a failure budget; `true` means this call should fail.
#[derive(Default)]
struct FailureBudget(AtomicU32);

impl FailureBudget {
    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn set(&self, n: u32) {
        self.0.store(n, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<NewAuditEntry>>,
    failures: FailureBudget,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<NewAuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.set(n);
    }
}

impl AuditLogger for MemoryAuditLog {
    fn record<'a>(&'a self, entry: &'a NewAuditEntry) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            if self.failures.take() {
                return Err(EscrowError::Internal("audit sink unavailable".into()));
            }
            lock(&self.entries)?.push(entry.clone());
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failures: FailureBudget,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.set(n);
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn dispatch<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            if self.failures.take() {
                return Err(EscrowError::Internal("notification channel unavailable".into()));
            }
            lock(&self.sent)?.push(notification.clone());
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct RecordingPayouts {
    executed: Mutex<Vec<PayoutInstruction>>,
}

impl RecordingPayouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<PayoutInstruction> {
        self.executed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl PayoutGateway for RecordingPayouts {
    fn execute<'a>(
        &'a self,
        instruction: &'a PayoutInstruction,
    ) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            lock(&self.executed)?.push(instruction.clone());
            Ok(())
        })
    }
}
