use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use shared::{OrderLineView, OrderStatus, OrderSummary, OrderView};
use uuid::Uuid;

use crate::error::OrderError;

/// Branch joined with its owning restaurant's user.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct BranchOwner {
    pub branch_id: i32,
    pub owner_id: i32,
    pub avg_waiting_time: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct MenuOwner {
    pub menu_id: i32,
    pub branch_id: i32,
    pub owner_id: i32,
}

/// Menu item as seen by the pricing engine, with the branch its menu belongs
/// to and whether that menu is active.
#[derive(Debug, Clone, PartialEq, Queryable)]
pub struct MenuItemInfo {
    pub id: i32,
    pub name: String,
    pub price: BigDecimal,
    pub available: bool,
    pub branch_id: i32,
    pub menu_active: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::restaurants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RestaurantRow {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::restaurants)]
pub struct NewRestaurant {
    pub user_id: i32,
    pub name: String,
    pub description: Option<String>,
}

/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::restaurants)]
pub struct RestaurantChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::branches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BranchRow {
    pub id: i32,
    pub restaurant_id: i32,
    pub address: String,
    pub city: String,
    pub avg_waiting_time: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::branches)]
pub struct NewBranch {
    pub restaurant_id: i32,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::branches)]
pub struct BranchChanges {
    pub address: Option<String>,
    pub city: Option<String>,
    pub avg_waiting_time: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::menus)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MenuRow {
    pub id: i32,
    pub branch_id: i32,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = crate::schema::menus)]
pub struct NewMenu {
    pub branch_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::menus)]
pub struct MenuChanges {
    pub name: Option<String>,
    pub active: Option<bool>,
}

impl MenuChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.active.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(belongs_to(MenuRow, foreign_key = menu_id))]
#[diesel(table_name = crate::schema::menu_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MenuItemRow {
    pub id: i32,
    pub menu_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub available: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::menu_items)]
pub struct NewMenuItem {
    pub menu_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub available: bool,
}

/// A menu with its items, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMenu {
    pub menu: MenuRow,
    pub items: Vec<MenuItemRow>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: i32,
    pub public_id: Uuid,
    pub customer_id: i32,
    pub branch_id: i32,
    pub delivery_address: String,
    pub status: String,
    pub total: BigDecimal,
    pub payment_method: String,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub estimated_ready_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub public_id: Uuid,
    pub customer_id: i32,
    pub branch_id: i32,
    pub delivery_address: String,
    pub status: String,
    pub total: BigDecimal,
    pub payment_method: String,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub estimated_ready_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: i32,
    pub order_id: i32,
    pub menu_item_id: i32,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct NewOrderItem {
    pub order_id: i32,
    pub menu_item_id: i32,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::idempotency_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct IdempotencyRecord {
    pub key: String,
    pub request_hash: Option<String>,
    pub order_id: i32,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::idempotency_keys)]
pub struct NewIdempotencyRecord {
    pub key: String,
    pub request_hash: Option<String>,
    pub order_id: i32,
    pub response: serde_json::Value,
}

/// An order row with its line items, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOrder {
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
}

impl OrderRow {
    pub fn order_status(&self) -> Result<OrderStatus, OrderError> {
        self.status
            .parse()
            .map_err(|e: String| OrderError::Internal(format!("order {}: {}", self.public_id, e)))
    }

    pub fn to_view(&self) -> Result<OrderView, OrderError> {
        Ok(OrderView {
            order_id: self.public_id,
            customer_id: self.customer_id,
            branch_id: self.branch_id,
            delivery_address: self.delivery_address.clone(),
            status: self.order_status()?,
            paid: self.paid,
            payment_method: self.payment_method.clone(),
            total: self.total.clone(),
            created_at: self.created_at,
            estimated_ready_at: self.estimated_ready_at,
            accepted_at: self.accepted_at,
            prepared_at: self.prepared_at,
            sent_at: self.sent_at,
            delivered_at: self.delivered_at,
            paid_at: self.paid_at,
            cancelled_at: self.cancelled_at,
        })
    }

    pub fn to_summary(&self) -> Result<OrderSummary, OrderError> {
        Ok(OrderSummary {
            order_id: self.public_id,
            customer_id: self.customer_id,
            branch_id: self.branch_id,
            status: self.order_status()?,
            paid: self.paid,
            total: self.total.clone(),
            created_at: self.created_at,
        })
    }
}

impl From<&OrderItemRow> for OrderLineView {
    fn from(row: &OrderItemRow) -> Self {
        Self {
            menu_item_id: row.menu_item_id,
            quantity: row.quantity,
            unit_price: row.unit_price.clone(),
        }
    }
}

impl StoredOrder {
    pub fn to_receipt(&self) -> Result<shared::OrderReceipt, OrderError> {
        Ok(shared::OrderReceipt {
            order: self.order.to_view()?,
            items: self.items.iter().map(OrderLineView::from).collect(),
        })
    }
}
