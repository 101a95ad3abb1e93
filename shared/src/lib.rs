use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    RestaurantOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::RestaurantOwner => "restaurant_owner",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "restaurant_owner" => Ok(Role::RestaurantOwner),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller, resolved upstream from a bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPrincipal {
    pub user_id: i32,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle actions addressable as `PATCH /orders/:id/<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Accept,
    Prepared,
    Sent,
    Delivered,
    Paid,
    Cancel,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Accept => "accept",
            OrderAction::Prepared => "prepared",
            OrderAction::Sent => "sent",
            OrderAction::Delivered => "delivered",
            OrderAction::Paid => "paid",
            OrderAction::Cancel => "cancel",
        }
    }
}

impl FromStr for OrderAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(OrderAction::Accept),
            "prepared" => Ok(OrderAction::Prepared),
            "sent" => Ok(OrderAction::Sent),
            "delivered" => Ok(OrderAction::Delivered),
            "paid" => Ok(OrderAction::Paid),
            "cancel" => Ok(OrderAction::Cancel),
            other => Err(format!("unknown order action: {}", other)),
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub menu_item_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub branch_id: i32,
    pub delivery_address: String,
    pub items: Vec<OrderItemRequest>,
}

/// Payload carried on the intake topic from the submit call to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderJob {
    pub public_id: Uuid,
    pub customer_id: i32,
    pub request: CreateOrderRequest,
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl OrderJob {
    pub fn new(
        customer_id: i32,
        request: CreateOrderRequest,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            public_id: Uuid::new_v4(),
            customer_id,
            request,
            idempotency_key,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Externally visible order. The internal sequential key never leaves the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: Uuid,
    pub customer_id: i32,
    pub branch_id: i32,
    pub delivery_address: String,
    pub status: OrderStatus,
    pub paid: bool,
    pub payment_method: String,
    pub total: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub estimated_ready_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineView {
    pub menu_item_id: i32,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

/// An order together with its priced line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order: OrderView,
    pub items: Vec<OrderLineView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub customer_id: i32,
    pub branch_id: i32,
    pub status: OrderStatus,
    pub paid: bool,
    pub total: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRestaurantRequest {
    pub user_id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRestaurantRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBranchRequest {
    pub restaurant_id: i32,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBranchRequest {
    pub address: Option<String>,
    pub city: Option<String>,
    pub avg_waiting_time: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMenuRequest {
    pub name: String,
    #[serde(default)]
    pub items: Vec<MenuItemRequest>,
}

/// Partial menu edit: rename or (de)activate, add new items, delete items by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditMenuRequest {
    pub name: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub add: Vec<MenuItemRequest>,
    #[serde(default)]
    pub delete: Vec<i32>,
}
