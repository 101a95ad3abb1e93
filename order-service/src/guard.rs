//! Ownership resolution along restaurant -> branch -> menu, shared by every
//! flow that has to decide whether a restaurant owner may touch a resource.

use shared::{AuthPrincipal, Role};

use crate::error::{OrderError, OrderResult};
use crate::models::{BranchOwner, MenuOwner, OrderRow};
use crate::store::OrderStore;

pub async fn resolve_branch_owner<S: OrderStore + ?Sized>(
    store: &S,
    branch_id: i32,
) -> OrderResult<Option<BranchOwner>> {
    store.branch_owner(branch_id).await
}

pub async fn resolve_menu_owner<S: OrderStore + ?Sized>(
    store: &S,
    menu_id: i32,
) -> OrderResult<Option<MenuOwner>> {
    store.menu_owner(menu_id).await
}

pub fn require_role(principal: &AuthPrincipal, allowed: &[Role]) -> OrderResult<()> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(OrderError::Forbidden(format!(
            "Role {} is not allowed to perform this action",
            principal.role
        )))
    }
}

/// Fails `Forbidden` unless `principal` owns `branch_id`. A missing branch is `NotFound`.
pub async fn ensure_branch_owner<S: OrderStore + ?Sized>(
    store: &S,
    principal: &AuthPrincipal,
    branch_id: i32,
) -> OrderResult<BranchOwner> {
    let branch = resolve_branch_owner(store, branch_id)
        .await?
        .ok_or_else(|| OrderError::not_found("Branch"))?;
    if branch.owner_id != principal.user_id {
        return Err(OrderError::forbidden());
    }
    Ok(branch)
}

pub async fn ensure_menu_owner<S: OrderStore + ?Sized>(
    store: &S,
    principal: &AuthPrincipal,
    menu_id: i32,
) -> OrderResult<MenuOwner> {
    let menu = resolve_menu_owner(store, menu_id)
        .await?
        .ok_or_else(|| OrderError::not_found("Menu"))?;
    if menu.owner_id != principal.user_id {
        return Err(OrderError::forbidden());
    }
    Ok(menu)
}

/// Read access: customers see their own orders, owners the orders of their
/// branches, admins everything.
pub async fn authorize_view<S: OrderStore + ?Sized>(
    store: &S,
    principal: &AuthPrincipal,
    order: &OrderRow,
) -> OrderResult<()> {
    match principal.role {
        Role::Admin => Ok(()),
        Role::Customer if order.customer_id == principal.user_id => Ok(()),
        Role::Customer => Err(OrderError::forbidden()),
        Role::RestaurantOwner => ensure_branch_owner(store, principal, order.branch_id)
            .await
            .map(|_| ()),
    }
}
