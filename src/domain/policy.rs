use super::escrow::{Actor, Escrow, NewEscrow};

/// Decides who may open an escrow and who may move it out of `active`.
pub trait AuthorizationPolicy: Send + Sync {
    fn can_create(&self, new: &NewEscrow, actor: &Actor) -> bool;
    fn can_release(&self, escrow: &Escrow, actor: &Actor) -> bool;
    fn can_cancel(&self, escrow: &Escrow, actor: &Actor) -> bool;
}

/// Create: the buyer named in the request, admins, system callers.
/// Release: buyer, listed approvers, admins.
/// Cancel: seller, admins or system callers; the seller is locked out
/// when `requires_admin_cancel` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthorizationPolicy;

impl AuthorizationPolicy for DefaultAuthorizationPolicy {
    fn can_create(&self, new: &NewEscrow, actor: &Actor) -> bool {
        actor.is_admin() || actor.is_system() || actor.id == new.buyer_id
    }

    fn can_release(&self, escrow: &Escrow, actor: &Actor) -> bool {
        actor.is_admin()
            || actor.id == escrow.buyer_id
            || escrow.release_conditions.approvers.contains(&actor.id)
    }

    fn can_cancel(&self, escrow: &Escrow, actor: &Actor) -> bool {
        if actor.is_admin() || actor.is_system() {
            return true;
        }
        !escrow.release_conditions.requires_admin_cancel && actor.id == escrow.seller_id
    }
}
