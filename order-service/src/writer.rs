use bigdecimal::BigDecimal;
use chrono::Duration;
use shared::{OrderLineView, OrderReceipt, OrderStatus, OrderView};
use tracing::info;
use uuid::Uuid;

use crate::db::db_now;
use crate::error::OrderResult;
use crate::idempotency;
use crate::models::{NewOrder, StoredOrder};
use crate::store::{OrderDraft, OrderStore};

pub const DEFAULT_PAYMENT_METHOD: &str = "cash";

#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub public_id: Uuid,
    pub customer_id: i32,
    pub branch_id: i32,
    pub delivery_address: String,
    pub ready_interval_minutes: i64,
    pub total: BigDecimal,
    pub lines: Vec<OrderLineView>,
    pub idempotency_key: Option<String>,
}

/// Persists the order, its line items and the idempotency entry as one unit.
///
/// Creation implies acceptance: the order starts in `preparing` with
/// `accepted_at` stamped. `estimated_ready_at` is derived here from the
/// interval, never taken from the caller.
pub async fn create_order(store: &dyn OrderStore, cmd: CreateOrderCommand) -> OrderResult<StoredOrder> {
    let now = db_now();
    let new_order = NewOrder {
        public_id: cmd.public_id,
        customer_id: cmd.customer_id,
        branch_id: cmd.branch_id,
        delivery_address: cmd.delivery_address.trim().to_string(),
        status: OrderStatus::Preparing.as_str().to_string(),
        total: cmd.total,
        payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        paid: false,
        created_at: now,
        estimated_ready_at: now + Duration::minutes(cmd.ready_interval_minutes),
        accepted_at: Some(now),
    };

    let receipt = OrderReceipt {
        order: preview(&new_order),
        items: cmd.lines.clone(),
    };
    let idempotency = idempotency::record(cmd.idempotency_key, None, &receipt)?;

    let stored = store
        .insert_order(OrderDraft {
            order: new_order,
            items: cmd.lines,
            idempotency,
        })
        .await?;

    info!(
        "Order {} created for customer {} at branch {} (total {})",
        stored.order.public_id, stored.order.customer_id, stored.order.branch_id, stored.order.total
    );
    Ok(stored)
}

fn preview(order: &NewOrder) -> OrderView {
    OrderView {
        order_id: order.public_id,
        customer_id: order.customer_id,
        branch_id: order.branch_id,
        delivery_address: order.delivery_address.clone(),
        status: OrderStatus::Preparing,
        paid: order.paid,
        payment_method: order.payment_method.clone(),
        total: order.total.clone(),
        created_at: order.created_at,
        estimated_ready_at: order.estimated_ready_at,
        accepted_at: order.accepted_at,
        prepared_at: None,
        sent_at: None,
        delivered_at: None,
        paid_at: None,
        cancelled_at: None,
    }
}
