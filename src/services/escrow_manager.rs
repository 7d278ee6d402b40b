use {
    crate::domain::{
        error::EscrowError,
        escrow::{Actor, Escrow, EscrowAction, EscrowStatus, NewEscrow},
        id::{EscrowId, PaymentId, UserId},
        notification::{Notification, NotificationKind},
        payment::PaymentStatus,
        payout::{PayoutInstruction, PayoutKind},
        policy::AuthorizationPolicy,
        ports::{Cas, EscrowRepository, PaymentRepository},
    },
    crate::services::side_effects::{Effect, SideEffects},
    std::sync::Arc,
};

/// Create, release and cancel escrow holds.
///
/// Every status change is a compare-and-set against `active` in the
/// repository, so of two racing release/cancel calls exactly one wins.
pub struct EscrowManager {
    payments: Arc<dyn PaymentRepository>,
    escrows: Arc<dyn EscrowRepository>,
    policy: Arc<dyn AuthorizationPolicy>,
    effects: SideEffects,
}

impl EscrowManager {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        escrows: Arc<dyn EscrowRepository>,
        policy: Arc<dyn AuthorizationPolicy>,
        effects: SideEffects,
    ) -> Self {
        Self {
            payments,
            escrows,
            policy,
            effects,
        }
    }

    #[tracing::instrument(name = "create_escrow", skip_all, fields(payment_id = %new.payment_id))]
    pub async fn create_escrow(&self, new: NewEscrow, actor: &Actor) -> Result<Escrow, EscrowError> {
        if !self.policy.can_create(&new, actor) {
            tracing::warn!(actor = %actor.id, buyer = %new.buyer_id, "escrow creation denied");
            return Err(EscrowError::Unauthorized(format!(
                "{} may not open an escrow for buyer {}",
                actor.id, new.buyer_id
            )));
        }
        if new.amount.is_zero() {
            return Err(EscrowError::Validation("escrow amount must be positive".into()));
        }
        if new.seller_id == new.buyer_id {
            return Err(EscrowError::Validation(
                "seller and buyer must be different users".into(),
            ));
        }

        let payment = self
            .payments
            .find(&new.payment_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(format!("payment {}", new.payment_id)))?;

        if payment.status != PaymentStatus::Completed {
            return Err(EscrowError::InvalidState(format!(
                "payment {} is {}, escrow requires completed",
                payment.id, payment.status
            )));
        }
        if payment.user_id != new.buyer_id {
            return Err(EscrowError::Validation(format!(
                "buyer {} did not make payment {}",
                new.buyer_id, payment.id
            )));
        }
        if new.amount > payment.money.amount() {
            return Err(EscrowError::Validation(format!(
                "escrow amount {} exceeds payment amount {}",
                new.amount,
                payment.money.amount()
            )));
        }
        if self.escrows.find_by_payment(&payment.id).await?.is_some() {
            return Err(EscrowError::DuplicateEscrow(payment.id.to_string()));
        }

        let escrow = Escrow::open(new, &payment.money);
        self.escrows.insert(&escrow).await?;

        // The payment may have been refunded between the read and the insert.
        let current = self.payments.find(&escrow.payment_id).await?;
        if current.as_ref().map(|p| p.status) != Some(PaymentStatus::Completed) {
            self.escrows
                .transition(&escrow.id, EscrowStatus::Active, EscrowStatus::Cancelled)
                .await?;
            tracing::warn!(escrow_id = %escrow.id, "payment changed during escrow creation, escrow voided");
            return Err(EscrowError::InvalidState(format!(
                "payment {} left completed during escrow creation",
                escrow.payment_id
            )));
        }

        tracing::info!(escrow_id = %escrow.id, amount = %escrow.money.amount(), "escrow created");
        self.effects
            .emit_all([
                Effect::Audit(escrow.audit_entry(&actor.audit_label(), "created", None)),
                Effect::Notify(Notification {
                    user_id: escrow.seller_id.clone(),
                    kind: NotificationKind::EscrowCreated,
                    payload: escrow_payload(&escrow),
                }),
            ])
            .await;
        Ok(escrow)
    }

    pub async fn release_escrow(&self, id: &EscrowId, actor: &Actor) -> Result<Escrow, EscrowError> {
        self.act(id, actor, EscrowAction::Release).await
    }

    pub async fn cancel_escrow(&self, id: &EscrowId, actor: &Actor) -> Result<Escrow, EscrowError> {
        self.act(id, actor, EscrowAction::Cancel).await
    }

    #[tracing::instrument(name = "escrow_action", skip_all, fields(escrow_id = %id, action = action.as_str()))]
    pub async fn act(
        &self,
        id: &EscrowId,
        actor: &Actor,
        action: EscrowAction,
    ) -> Result<Escrow, EscrowError> {
        let escrow = self.get_escrow(id).await?;

        let allowed = match action {
            EscrowAction::Release => self.policy.can_release(&escrow, actor),
            EscrowAction::Cancel => self.policy.can_cancel(&escrow, actor),
        };
        if !allowed {
            tracing::warn!(actor = %actor.id, "escrow action denied");
            return Err(EscrowError::Unauthorized(format!(
                "{} may not {} escrow {id}",
                actor.id,
                action.as_str()
            )));
        }
        if escrow.status != EscrowStatus::Active {
            return Err(invalid_state(&escrow));
        }
        let backing = self.payments.find(&escrow.payment_id).await?;
        if backing.as_ref().map(|p| p.status) != Some(PaymentStatus::Completed) {
            tracing::warn!(payment_id = %escrow.payment_id, "backing payment no longer completed");
            return Err(EscrowError::InvalidState(format!(
                "payment {} backing escrow {id} is no longer completed",
                escrow.payment_id
            )));
        }

        let updated = match self
            .escrows
            .transition(id, EscrowStatus::Active, action.target())
            .await?
        {
            Cas::Applied(updated) => updated,
            Cas::Conflict(current) => return Err(invalid_state(&current)),
            Cas::Missing => return Err(EscrowError::NotFound(format!("escrow {id}"))),
        };

        tracing::info!(status = %updated.status, "escrow transitioned");
        self.effects
            .emit_all(transition_effects(&updated, actor, action))
            .await;
        Ok(updated)
    }

    /// Cancel the active escrow of a payment the provider has refunded.
    /// The buyer already has the money back, so no refund payout is issued.
    #[tracing::instrument(name = "escrow_refund_void", skip_all, fields(payment_id = %payment_id))]
    pub async fn void_for_refund(
        &self,
        payment_id: &PaymentId,
        actor: &Actor,
    ) -> Result<Option<Escrow>, EscrowError> {
        let Some(escrow) = self.escrows.find_by_payment(payment_id).await? else {
            return Ok(None);
        };
        if !self.policy.can_cancel(&escrow, actor) {
            return Err(EscrowError::Unauthorized(format!(
                "{} may not cancel escrow {}",
                actor.id, escrow.id
            )));
        }

        let current = match escrow.status {
            EscrowStatus::Active => match self
                .escrows
                .transition(&escrow.id, EscrowStatus::Active, EscrowStatus::Cancelled)
                .await?
            {
                Cas::Applied(updated) => {
                    tracing::info!(escrow_id = %updated.id, "escrow cancelled for refunded payment");
                    let mut audit = updated.audit_entry(
                        &actor.audit_label(),
                        "cancelled",
                        Some(EscrowStatus::Active),
                    );
                    audit.detail["reason"] = serde_json::json!("payment_refunded");
                    self.effects
                        .emit_all([
                            Effect::Audit(audit),
                            Effect::Notify(Notification {
                                user_id: updated.seller_id.clone(),
                                kind: NotificationKind::EscrowCancelled,
                                payload: escrow_payload(&updated),
                            }),
                        ])
                        .await;
                    return Ok(Some(updated));
                }
                Cas::Conflict(current) => current,
                Cas::Missing => return Ok(None),
            },
            _ => escrow,
        };

        if current.status == EscrowStatus::Released {
            tracing::error!(
                alert = true,
                escrow_id = %current.id,
                "payment refunded after its escrow was released"
            );
        }
        Ok(None)
    }

    pub async fn get_escrow(&self, id: &EscrowId) -> Result<Escrow, EscrowError> {
        self.escrows
            .find(id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(format!("escrow {id}")))
    }

    pub async fn get_user_escrows(&self, user_id: &UserId) -> Result<Vec<Escrow>, EscrowError> {
        self.escrows.list_for_user(user_id).await
    }
}

fn invalid_state(escrow: &Escrow) -> EscrowError {
    EscrowError::InvalidState(format!("escrow {} is {}", escrow.id, escrow.status))
}

fn escrow_payload(escrow: &Escrow) -> serde_json::Value {
    serde_json::json!({
        "escrow_id": escrow.id,
        "payment_id": escrow.payment_id.as_str(),
        "project_id": escrow.project_id.as_str(),
        "amount": escrow.money.amount().cents(),
        "currency": escrow.money.currency().as_str(),
        "status": escrow.status.as_str(),
    })
}

fn transition_effects(escrow: &Escrow, actor: &Actor, action: EscrowAction) -> Vec<Effect> {
    let (audit_action, payout_kind, recipient, kind) = match action {
        EscrowAction::Release => (
            "released",
            PayoutKind::Transfer,
            &escrow.seller_id,
            NotificationKind::EscrowReleased,
        ),
        EscrowAction::Cancel => (
            "cancelled",
            PayoutKind::Refund,
            &escrow.buyer_id,
            NotificationKind::EscrowCancelled,
        ),
    };

    vec![
        Effect::Audit(escrow.audit_entry(
            &actor.audit_label(),
            audit_action,
            Some(EscrowStatus::Active),
        )),
        Effect::Payout(PayoutInstruction {
            escrow_id: escrow.id,
            kind: payout_kind,
            recipient: recipient.clone(),
            money: escrow.money.clone(),
        }),
        Effect::Notify(Notification {
            user_id: recipient.clone(),
            kind,
            payload: escrow_payload(escrow),
        }),
    ]
}
