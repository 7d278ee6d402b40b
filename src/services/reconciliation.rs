use {
    crate::domain::{
        audit::NewAuditEntry,
        error::EscrowError,
        escrow::Actor,
        id::UserId,
        notification::{Notification, NotificationKind},
        payment::{Payment, PaymentStatus, ProviderUpdate, TransactionRecord},
        ports::{Cas, PaymentRepository},
        webhook::{
            FIELD_SIGNATURE, MappedStatus, ReconcileOutcome, RequestContext, StatusMapper,
            WebhookEvent,
        },
    },
    crate::services::{
        escrow_manager::EscrowManager,
        side_effects::{Effect, SideEffects},
        signature,
    },
    chrono::Utc,
    std::{collections::BTreeMap, sync::Arc},
};

/// Conditional updates that lose a race are re-evaluated against the fresh row.
const MAX_CAS_ATTEMPTS: usize = 3;

/// Applies verified provider callbacks to payments, exactly once per transition.
pub struct WebhookEngine {
    payments: Arc<dyn PaymentRepository>,
    escrows: Arc<EscrowManager>,
    mapper: Arc<dyn StatusMapper>,
    effects: SideEffects,
    secret: Arc<str>,
    provider: String,
    actor: Actor,
}

impl WebhookEngine {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        escrows: Arc<EscrowManager>,
        mapper: Arc<dyn StatusMapper>,
        effects: SideEffects,
        secret: Arc<str>,
        provider: impl Into<String>,
    ) -> Result<Self, EscrowError> {
        let provider = provider.into();
        let actor = Actor::system(UserId::new(format!("webhook:{provider}"))?);
        Ok(Self {
            payments,
            escrows,
            mapper,
            effects,
            secret,
            provider,
            actor,
        })
    }

    #[tracing::instrument(
        name = "webhook",
        skip_all,
        fields(payment_id = tracing::field::Empty, status = tracing::field::Empty)
    )]
    pub async fn handle(
        &self,
        raw_fields: BTreeMap<String, String>,
        raw_body: String,
        ctx: &RequestContext,
    ) -> Result<ReconcileOutcome, EscrowError> {
        let provided = raw_fields.get(FIELD_SIGNATURE).cloned().unwrap_or_default();
        if !signature::verify(&raw_fields, &provided, &self.secret) {
            tracing::warn!(source_ip = ?ctx.source_ip, "webhook signature rejected");
            return Err(EscrowError::Signature("signature verification failed".into()));
        }

        let event = WebhookEvent::from_fields(&raw_fields, raw_body)?;
        tracing::Span::current().record("status", tracing::field::display(&event.reported_status));

        let mapped = self.mapper.map(&event.reported_status);
        let payment = self.lookup(&event, ctx).await?;
        tracing::Span::current().record("payment_id", tracing::field::display(&payment.id));

        let target = match mapped {
            MappedStatus::Apply(status) => status,
            MappedStatus::Ignore => {
                tracing::info!(reported = %event.reported_status, "intermediate status ignored");
                return Ok(ReconcileOutcome::Ignored(payment.id));
            }
        };

        let amount_mismatch = event
            .amount
            .filter(|amount| *amount != payment.money.amount());
        if let (PaymentStatus::Completed, Some(amount)) = (target, amount_mismatch) {
            tracing::warn!(
                security = true,
                expected = %payment.money.amount(),
                reported = %amount,
                "webhook amount does not match payment"
            );
            return Err(EscrowError::Validation("amount mismatch".into()));
        }

        let update = ProviderUpdate {
            status: target,
            provider_payment_id: event
                .provider_payment_id
                .clone()
                .or_else(|| payment.provider_payment_id.clone()),
            provider_signature: event.signature.clone(),
            provider_timestamp: event.provider_timestamp.unwrap_or_else(Utc::now),
            raw_provider_response: event.raw_body.clone(),
        };

        self.reconcile(payment, update, ctx).await
    }

    async fn lookup(
        &self,
        event: &WebhookEvent,
        ctx: &RequestContext,
    ) -> Result<Payment, EscrowError> {
        let mut found = match &event.payment_id {
            Some(id) => self.payments.find(id).await?,
            None => None,
        };
        if found.is_none() {
            if let Some(pid) = &event.provider_payment_id {
                found = self.payments.find_by_provider_id(pid).await?;
            }
        }

        let Some(payment) = found else {
            let reference = event
                .payment_id
                .as_ref()
                .map(|id| id.to_string())
                .or_else(|| event.provider_payment_id.clone())
                .unwrap_or_default();
            tracing::warn!(
                security = true,
                reference = %reference,
                source_ip = ?ctx.source_ip,
                "verified webhook references unknown payment"
            );
            self.effects
                .emit(Effect::Audit(NewAuditEntry::new(
                    "payment",
                    &reference,
                    "webhook_unknown_payment",
                    &self.actor.audit_label(),
                    serde_json::json!({
                        "provider": self.provider,
                        "reported_status": event.reported_status,
                        "source_ip": ctx.source_ip,
                        "user_agent": ctx.user_agent,
                    }),
                )))
                .await;
            return Err(EscrowError::NotFound(format!("payment {reference}")));
        };
        Ok(payment)
    }

    async fn reconcile(
        &self,
        mut current: Payment,
        update: ProviderUpdate,
        ctx: &RequestContext,
    ) -> Result<ReconcileOutcome, EscrowError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.is_same_delivery(&update) {
                tracing::info!("duplicate delivery, already applied");
                self.ensure_follow_up(&current).await?;
                return Ok(ReconcileOutcome::Duplicate(current.id));
            }

            if !current.status.can_transition_to(&update.status) {
                tracing::error!(
                    alert = true,
                    from = %current.status,
                    to = %update.status,
                    terminal = current.status.is_terminal(),
                    "invalid payment transition from provider, acknowledged without change"
                );
                return Ok(ReconcileOutcome::Rejected {
                    payment_id: current.id,
                    current: current.status,
                    attempted: update.status,
                });
            }

            let from = current.status;
            match self.payments.transition(&current.id, from, &update).await? {
                Cas::Applied(updated) => {
                    tracing::info!(from = %from, to = %updated.status, "payment transitioned");
                    self.effects
                        .emit_all(self.transition_effects(&updated, from, ctx))
                        .await;
                    self.ensure_follow_up(&updated).await?;
                    return Ok(ReconcileOutcome::Applied {
                        payment_id: updated.id,
                        from,
                        to: updated.status,
                    });
                }
                Cas::Conflict(latest) => {
                    tracing::debug!(seen = %from, now = %latest.status, "lost payment update race, re-evaluating");
                    current = latest;
                }
                Cas::Missing => {
                    return Err(EscrowError::NotFound(format!("payment {}", current.id)));
                }
            }
        }

        Err(EscrowError::Internal(format!(
            "payment {} kept changing under concurrent updates",
            current.id
        )))
    }

    fn transition_effects(
        &self,
        payment: &Payment,
        from: PaymentStatus,
        ctx: &RequestContext,
    ) -> Vec<Effect> {
        let mut audit = payment.audit_entry(&self.actor.audit_label(), "status_changed");
        audit.detail = serde_json::json!({
            "payment_id": payment.id.as_str(),
            "old_status": from.as_str(),
            "new_status": payment.status.as_str(),
            "provider": self.provider,
            "provider_payment_id": payment.provider_payment_id,
            "source_ip": ctx.source_ip,
            "user_agent": ctx.user_agent,
        });

        let mut effects = vec![Effect::Audit(audit)];
        if let Some(kind) = notification_kind(payment.status) {
            effects.push(Effect::Notify(Notification {
                user_id: payment.user_id.clone(),
                kind,
                payload: serde_json::json!({
                    "payment_id": payment.id.as_str(),
                    "amount": payment.money.amount().cents(),
                    "currency": payment.money.currency().as_str(),
                    "status": payment.status.as_str(),
                }),
            }));
        }
        effects
    }

    /// Work owed by the payment's current status. Idempotent, so a
    /// redelivery finishes what a failed earlier delivery left undone.
    async fn ensure_follow_up(&self, payment: &Payment) -> Result<(), EscrowError> {
        match payment.status {
            PaymentStatus::Completed => self.ensure_completion_records(payment).await,
            PaymentStatus::Refunded => {
                self.escrows.void_for_refund(&payment.id, &self.actor).await?;
                Ok(())
            }
            PaymentStatus::Pending | PaymentStatus::Failed => Ok(()),
        }
    }

    /// Transaction row and requested escrow for a completed payment.
    /// Both are insert-if-absent, so redeliveries repair a partial failure.
    async fn ensure_completion_records(&self, payment: &Payment) -> Result<(), EscrowError> {
        if self
            .payments
            .record_transaction(&TransactionRecord::for_payment(payment))
            .await?
        {
            tracing::info!("transaction recorded");
        }

        let Some(intent) = payment.escrow_intent.clone() else {
            return Ok(());
        };
        let new = intent.into_new_escrow(payment.id.clone(), payment.user_id.clone());
        match self.escrows.create_escrow(new, &self.actor).await {
            Ok(escrow) => {
                tracing::info!(escrow_id = %escrow.id, "escrow opened for completed payment");
                Ok(())
            }
            Err(EscrowError::DuplicateEscrow(_)) => Ok(()),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                tracing::error!(alert = true, error = %e, "escrow intent could not be honoured");
                Ok(())
            }
        }
    }
}

fn notification_kind(status: PaymentStatus) -> Option<NotificationKind> {
    match status {
        PaymentStatus::Completed => Some(NotificationKind::PaymentConfirmed),
        PaymentStatus::Failed => Some(NotificationKind::PaymentFailed),
        PaymentStatus::Refunded => Some(NotificationKind::RefundIssued),
        PaymentStatus::Pending => None,
    }
}
