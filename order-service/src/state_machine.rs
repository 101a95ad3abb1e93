//! Order lifecycle transitions.
//!
//! Who may run an action, on which orders and from which states is a single
//! table, [`CAPABILITIES`]. Every transition resolves the order, authorizes
//! against the table, checks the current state and then issues a
//! conditional update so a concurrent writer cannot slip between the check
//! and the write.

use shared::{AuthPrincipal, OrderAction, OrderStatus, Role};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::db_now;
use crate::error::{OrderError, OrderResult};
use crate::guard;
use crate::models::{OrderRow, StoredOrder};
use crate::store::{OrderStore, Stamp, TransitionUpdate};

/// Which orders a role may act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Any,
    /// The caller owns the order's branch.
    BranchOwner,
    /// The caller placed the order.
    OrderOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub action: OrderAction,
    pub role: Role,
    pub scope: Scope,
    pub from: &'static [OrderStatus],
}

use OrderStatus::*;

#[rustfmt::skip]
pub const CAPABILITIES: &[Capability] = &[
    Capability { action: OrderAction::Accept, role: Role::RestaurantOwner, scope: Scope::BranchOwner, from: &[Pending] },
    Capability { action: OrderAction::Accept, role: Role::Admin, scope: Scope::Any, from: &[Pending] },
    Capability { action: OrderAction::Prepared, role: Role::RestaurantOwner, scope: Scope::BranchOwner, from: &[Preparing] },
    Capability { action: OrderAction::Sent, role: Role::RestaurantOwner, scope: Scope::BranchOwner, from: &[Preparing, OnTheWay] },
    Capability { action: OrderAction::Delivered, role: Role::RestaurantOwner, scope: Scope::BranchOwner, from: &[OnTheWay] },
    Capability { action: OrderAction::Paid, role: Role::RestaurantOwner, scope: Scope::BranchOwner, from: &[Delivered] },
    Capability { action: OrderAction::Cancel, role: Role::Customer, scope: Scope::OrderOwner, from: &[Pending] },
    Capability { action: OrderAction::Cancel, role: Role::RestaurantOwner, scope: Scope::BranchOwner, from: &[Pending, Preparing] },
    Capability { action: OrderAction::Cancel, role: Role::Admin, scope: Scope::Any, from: &[Pending, Preparing, OnTheWay, Delivered] },
];

pub fn capability(action: OrderAction, role: Role) -> Option<&'static Capability> {
    CAPABILITIES
        .iter()
        .find(|cap| cap.action == action && cap.role == role)
}

/// Status reached by `action` and the timestamp it sets.
pub fn target(action: OrderAction) -> (OrderStatus, Stamp) {
    match action {
        OrderAction::Accept => (Preparing, Stamp::Accepted),
        OrderAction::Prepared => (OnTheWay, Stamp::Prepared),
        OrderAction::Sent => (OnTheWay, Stamp::Sent),
        OrderAction::Delivered => (Delivered, Stamp::Delivered),
        OrderAction::Paid => (Delivered, Stamp::Paid),
        OrderAction::Cancel => (Cancelled, Stamp::Cancelled),
    }
}

fn stamp_is_set(order: &OrderRow, stamp: Stamp) -> bool {
    match stamp {
        Stamp::Accepted => order.accepted_at.is_some(),
        Stamp::Prepared => order.prepared_at.is_some(),
        Stamp::Sent => order.sent_at.is_some(),
        Stamp::Delivered => order.delivered_at.is_some(),
        Stamp::Paid => order.paid_at.is_some(),
        Stamp::Cancelled => order.cancelled_at.is_some(),
    }
}

async fn authorize(
    store: &dyn OrderStore,
    principal: &AuthPrincipal,
    cap: &Capability,
    order: &OrderRow,
) -> OrderResult<()> {
    match cap.scope {
        Scope::Any => Ok(()),
        Scope::OrderOwner if order.customer_id == principal.user_id => Ok(()),
        Scope::OrderOwner => Err(OrderError::forbidden()),
        Scope::BranchOwner => guard::ensure_branch_owner(store, principal, order.branch_id)
            .await
            .map(|_| ()),
    }
}

/// Paid orders and already-written timestamps reject the transition the
/// same way a wrong status does.
fn check_state(cap: &Capability, order: &OrderRow, stamp: Stamp, to: OrderStatus) -> OrderResult<()> {
    let current = order.order_status()?;
    if !cap.from.contains(&current) || order.paid || stamp_is_set(order, stamp) {
        return Err(OrderError::InvalidTransition { from: current, to });
    }
    Ok(())
}

pub async fn apply(
    store: &dyn OrderStore,
    principal: &AuthPrincipal,
    public_id: Uuid,
    action: OrderAction,
) -> OrderResult<StoredOrder> {
    let stored = store
        .order(public_id)
        .await?
        .ok_or_else(|| OrderError::not_found("Order"))?;

    let cap = capability(action, principal.role).ok_or_else(|| {
        OrderError::Forbidden(format!("Role {} cannot {} orders", principal.role, action))
    })?;
    authorize(store, principal, cap, &stored.order).await?;

    let (to, stamp) = target(action);
    check_state(cap, &stored.order, stamp, to)?;

    let update = TransitionUpdate {
        public_id,
        from: cap.from.to_vec(),
        to,
        stamp,
        at: db_now(),
    };

    match store.apply_transition(&update).await? {
        Some(order) => {
            info!(
                "Order {} {} by {} {}: {} -> {}",
                public_id, action, principal.role, principal.user_id, stored.order.status, order.status
            );
            Ok(StoredOrder {
                order,
                items: stored.items,
            })
        }
        None => {
            let latest = store
                .order(public_id)
                .await?
                .ok_or_else(|| OrderError::not_found("Order"))?;
            let from = latest.order.order_status()?;
            warn!(
                "Order {} changed concurrently, {} rejected in status {}",
                public_id, action, from
            );
            Err(OrderError::InvalidTransition { from, to })
        }
    }
}
