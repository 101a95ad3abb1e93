use std::collections::{BTreeSet, HashMap};

use bigdecimal::BigDecimal;
use num_traits::Zero;
use shared::{CreateOrderRequest, OrderItemRequest, OrderLineView};

use crate::error::{OrderError, OrderResult};
use crate::guard;
use crate::models::{BranchOwner, MenuItemInfo};
use crate::store::OrderStore;

pub const MIN_ADDRESS_LEN: usize = 5;
pub const MINUTES_PER_ITEM: i64 = 2;
/// `orders.total` is `NUMERIC(12, 2)`.
pub const MAX_TOTAL_CENTS: i64 = 999_999_999_999;

pub fn max_total() -> BigDecimal {
    BigDecimal::new(MAX_TOTAL_CENTS.into(), 2)
}

/// Server-side price snapshot of a requested order.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedOrder {
    pub branch: BranchOwner,
    pub total: BigDecimal,
    pub lines: Vec<OrderLineView>,
    pub ready_interval_minutes: i64,
}

/// Shape checks that need no store access.
pub fn validate_request(request: &CreateOrderRequest) -> OrderResult<()> {
    if request.branch_id <= 0 {
        return Err(OrderError::validation("branch_id must be a positive integer"));
    }
    if request.delivery_address.trim().chars().count() < MIN_ADDRESS_LEN {
        return Err(OrderError::validation(format!(
            "delivery_address must be at least {} characters",
            MIN_ADDRESS_LEN
        )));
    }
    if request.items.is_empty() {
        return Err(OrderError::validation("items must contain at least one entry"));
    }
    for item in &request.items {
        if item.menu_item_id <= 0 {
            return Err(OrderError::validation("menu_item_id must be a positive integer"));
        }
        if item.quantity < 1 {
            return Err(OrderError::validation(format!(
                "quantity for menu item {} must be at least 1",
                item.menu_item_id
            )));
        }
    }
    Ok(())
}

/// `avg_waiting_time` plus two minutes per requested line.
pub fn ready_interval_minutes(avg_waiting_time: i32, item_count: usize) -> i64 {
    i64::from(avg_waiting_time.max(0)) + MINUTES_PER_ITEM * item_count as i64
}

pub async fn price_order<S: OrderStore + ?Sized>(
    store: &S,
    branch_id: i32,
    requested: &[OrderItemRequest],
) -> OrderResult<PricedOrder> {
    let branch = guard::resolve_branch_owner(store, branch_id)
        .await?
        .ok_or_else(|| OrderError::not_found("Branch"))?;

    let ids: Vec<i32> = requested
        .iter()
        .map(|item| item.menu_item_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let resolved = store.menu_items(&ids).await?;

    price_items(branch, requested, resolved)
}

/// Prices `requested` against the resolved menu items. Client prices are never consulted.
pub fn price_items(
    branch: BranchOwner,
    requested: &[OrderItemRequest],
    resolved: Vec<MenuItemInfo>,
) -> OrderResult<PricedOrder> {
    if requested.is_empty() {
        return Err(OrderError::validation("items must contain at least one entry"));
    }
    if !branch.active {
        return Err(OrderError::validation(format!(
            "Branch {} is not accepting orders",
            branch.branch_id
        )));
    }

    let distinct: BTreeSet<i32> = requested.iter().map(|item| item.menu_item_id).collect();
    let by_id: HashMap<i32, MenuItemInfo> =
        resolved.into_iter().map(|item| (item.id, item)).collect();
    if by_id.len() != distinct.len() || distinct.iter().any(|id| !by_id.contains_key(id)) {
        return Err(OrderError::validation("One or more menu items not found"));
    }

    let mut total = BigDecimal::zero();
    let mut lines = Vec::with_capacity(requested.len());
    for item in requested {
        let menu_item = &by_id[&item.menu_item_id];
        if menu_item.branch_id != branch.branch_id {
            return Err(OrderError::validation(format!(
                "Menu item {} does not belong to branch {}",
                menu_item.name, branch.branch_id
            )));
        }
        // An item on a deactivated menu is off sale even if flagged available.
        if !menu_item.available || !menu_item.menu_active {
            return Err(OrderError::validation(format!(
                "Menu item {} is not available",
                menu_item.name
            )));
        }

        total += menu_item.price.clone() * BigDecimal::from(item.quantity);
        lines.push(OrderLineView {
            menu_item_id: item.menu_item_id,
            quantity: item.quantity,
            unit_price: menu_item.price.clone(),
        });
    }

    if total > max_total() {
        return Err(OrderError::validation(format!(
            "Order total exceeds the maximum of {}",
            max_total()
        )));
    }

    Ok(PricedOrder {
        ready_interval_minutes: ready_interval_minutes(branch.avg_waiting_time, requested.len()),
        branch,
        total,
        lines,
    })
}
