//! Relational store capability consumed by the order engine.
//!
//! The engine only talks to [`OrderStore`], catalog management to
//! [`CatalogStore`]; production wires in [`PgOrderStore`] for both, tests
//! wire in the in-memory double.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel_async::AsyncConnection;
use shared::{OrderLineView, OrderStatus};
use uuid::Uuid;

use crate::db::{DbPool, Transaction};
use crate::error::{OrderError, OrderResult};
use crate::models::*;
use crate::repository;

#[cfg(test)]
pub mod memory;

/// Timestamp column written by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Accepted,
    Prepared,
    Sent,
    Delivered,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionUpdate {
    pub public_id: Uuid,
    pub from: Vec<OrderStatus>,
    pub to: OrderStatus,
    pub stamp: Stamp,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub customer_id: Option<i32>,
    pub branch_id: Option<i32>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct IdempotencyDraft {
    pub key: String,
    pub request_hash: Option<String>,
    pub response: serde_json::Value,
}

/// Everything persisted by one order-create unit of work.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order: NewOrder,
    pub items: Vec<OrderLineView>,
    pub idempotency: Option<IdempotencyDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuItemDraft {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub available: bool,
}

impl MenuItemDraft {
    pub fn for_menu(&self, menu_id: i32) -> NewMenuItem {
        NewMenuItem {
            menu_id,
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price.clone(),
            available: self.available,
        }
    }
}

/// A menu and its first items, written in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuDraft {
    pub menu: NewMenu,
    pub items: Vec<MenuItemDraft>,
}

/// One atomic menu edit. `delete` ids must all belong to the menu.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuEdit {
    pub changes: MenuChanges,
    pub add: Vec<MenuItemDraft>,
    pub delete: Vec<i32>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn branch_owner(&self, branch_id: i32) -> OrderResult<Option<BranchOwner>>;

    async fn menu_owner(&self, menu_id: i32) -> OrderResult<Option<MenuOwner>>;

    async fn menu_items(&self, ids: &[i32]) -> OrderResult<Vec<MenuItemInfo>>;

    async fn idempotency(&self, key: &str) -> OrderResult<Option<IdempotencyRecord>>;

    /// Persists order, line items and idempotency key atomically.
    async fn insert_order(&self, draft: OrderDraft) -> OrderResult<StoredOrder>;

    async fn order(&self, public_id: Uuid) -> OrderResult<Option<StoredOrder>>;

    async fn list_orders(&self, filter: &OrderFilter) -> OrderResult<Vec<OrderRow>>;

    async fn apply_transition(&self, update: &TransitionUpdate) -> OrderResult<Option<OrderRow>>;
}

/// Restaurant, branch and menu management. Ownership lookups come from the
/// [`OrderStore`] supertrait.
#[async_trait]
pub trait CatalogStore: OrderStore {
    async fn insert_restaurant(&self, restaurant: NewRestaurant) -> OrderResult<RestaurantRow>;

    async fn restaurants(&self) -> OrderResult<Vec<RestaurantRow>>;

    async fn restaurant(&self, id: i32) -> OrderResult<Option<RestaurantRow>>;

    async fn update_restaurant(
        &self,
        id: i32,
        changes: RestaurantChanges,
    ) -> OrderResult<Option<RestaurantRow>>;

    async fn branches_of(&self, restaurant_id: i32) -> OrderResult<Vec<BranchRow>>;

    async fn insert_branch(&self, branch: NewBranch) -> OrderResult<BranchRow>;

    async fn update_branch(&self, id: i32, changes: BranchChanges) -> OrderResult<Option<BranchRow>>;

    async fn toggle_branch_active(&self, id: i32) -> OrderResult<Option<BranchRow>>;

    /// Persists the menu and its items atomically.
    async fn insert_menu(&self, draft: MenuDraft) -> OrderResult<StoredMenu>;

    async fn menus_of(&self, branch_id: i32) -> OrderResult<Vec<StoredMenu>>;

    /// Applies changes, deletions and additions atomically. `None` when the menu is gone.
    async fn edit_menu(&self, menu_id: i32, edit: MenuEdit) -> OrderResult<Option<StoredMenu>>;

    async fn toggle_menu_active(&self, id: i32) -> OrderResult<Option<MenuRow>>;
}

pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn branch_owner(&self, branch_id: i32) -> OrderResult<Option<BranchOwner>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::branch_owner(&mut conn, branch_id).await?)
    }

    async fn menu_owner(&self, menu_id: i32) -> OrderResult<Option<MenuOwner>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::menu_owner(&mut conn, menu_id).await?)
    }

    async fn menu_items(&self, ids: &[i32]) -> OrderResult<Vec<MenuItemInfo>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::menu_items_by_ids(&mut conn, ids).await?)
    }

    async fn idempotency(&self, key: &str) -> OrderResult<Option<IdempotencyRecord>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::idempotency_by_key(&mut conn, key).await?)
    }

    async fn insert_order(&self, draft: OrderDraft) -> OrderResult<StoredOrder> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, OrderError, _>(|conn| {
            Box::pin(async move {
                let mut tx = Transaction::begun(conn);

                let order = repository::insert_order(&mut tx, &draft.order).await?;

                let new_items: Vec<NewOrderItem> = draft
                    .items
                    .iter()
                    .map(|line| NewOrderItem {
                        order_id: order.id,
                        menu_item_id: line.menu_item_id,
                        quantity: line.quantity,
                        unit_price: line.unit_price.clone(),
                    })
                    .collect();
                let items = repository::insert_order_items(&mut tx, &new_items).await?;

                if let Some(entry) = draft.idempotency {
                    let record = NewIdempotencyRecord {
                        key: entry.key.clone(),
                        request_hash: entry.request_hash,
                        order_id: order.id,
                        response: entry.response,
                    };
                    if repository::insert_idempotency(&mut tx, &record).await? == 0 {
                        return Err(OrderError::Duplicate(entry.key));
                    }
                }

                Ok(StoredOrder { order, items })
            })
        })
        .await
    }

    async fn order(&self, public_id: Uuid) -> OrderResult<Option<StoredOrder>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::order_by_public_id(&mut conn, public_id).await?)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> OrderResult<Vec<OrderRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::list_orders(&mut conn, filter).await?)
    }

    async fn apply_transition(&self, update: &TransitionUpdate) -> OrderResult<Option<OrderRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::apply_transition(&mut conn, update).await?)
    }
}

#[async_trait]
impl CatalogStore for PgOrderStore {
    async fn insert_restaurant(&self, restaurant: NewRestaurant) -> OrderResult<RestaurantRow> {
        let mut conn = self.pool.get().await?;
        Ok(repository::insert_restaurant(&mut conn, &restaurant).await?)
    }

    async fn restaurants(&self) -> OrderResult<Vec<RestaurantRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::restaurants(&mut conn).await?)
    }

    async fn restaurant(&self, id: i32) -> OrderResult<Option<RestaurantRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::restaurant_by_id(&mut conn, id).await?)
    }

    async fn update_restaurant(
        &self,
        id: i32,
        changes: RestaurantChanges,
    ) -> OrderResult<Option<RestaurantRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::update_restaurant(&mut conn, id, &changes).await?)
    }

    async fn branches_of(&self, restaurant_id: i32) -> OrderResult<Vec<BranchRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::branches_by_restaurant(&mut conn, restaurant_id).await?)
    }

    async fn insert_branch(&self, branch: NewBranch) -> OrderResult<BranchRow> {
        let mut conn = self.pool.get().await?;
        Ok(repository::insert_branch(&mut conn, &branch).await?)
    }

    async fn update_branch(&self, id: i32, changes: BranchChanges) -> OrderResult<Option<BranchRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::update_branch(&mut conn, id, &changes).await?)
    }

    async fn toggle_branch_active(&self, id: i32) -> OrderResult<Option<BranchRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::toggle_branch_active(&mut conn, id).await?)
    }

    async fn insert_menu(&self, draft: MenuDraft) -> OrderResult<StoredMenu> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, OrderError, _>(|conn| {
            Box::pin(async move {
                let mut tx = Transaction::begun(conn);

                let menu = repository::insert_menu(&mut tx, &draft.menu).await?;
                let new_items: Vec<NewMenuItem> =
                    draft.items.iter().map(|item| item.for_menu(menu.id)).collect();
                let items = repository::insert_menu_items(&mut tx, &new_items).await?;

                Ok(StoredMenu { menu, items })
            })
        })
        .await
    }

    async fn menus_of(&self, branch_id: i32) -> OrderResult<Vec<StoredMenu>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::menus_with_items(&mut conn, branch_id).await?)
    }

    async fn edit_menu(&self, menu_id: i32, edit: MenuEdit) -> OrderResult<Option<StoredMenu>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, OrderError, _>(|conn| {
            Box::pin(async move {
                let mut tx = Transaction::begun(conn);

                let menu = if edit.changes.is_empty() {
                    repository::menu_by_id(tx.conn(), menu_id).await?
                } else {
                    repository::update_menu(&mut tx, menu_id, &edit.changes).await?
                };
                let Some(menu) = menu else {
                    return Ok(None);
                };

                if !edit.delete.is_empty() {
                    let removed = repository::delete_menu_items(&mut tx, menu.id, &edit.delete).await?;
                    if removed != edit.delete.len() {
                        return Err(OrderError::validation(
                            "One or more menu items do not belong to this menu",
                        ));
                    }
                }

                let new_items: Vec<NewMenuItem> =
                    edit.add.iter().map(|item| item.for_menu(menu.id)).collect();
                repository::insert_menu_items(&mut tx, &new_items).await?;

                let items = repository::menu_items_of(tx.conn(), menu.id).await?;
                Ok(Some(StoredMenu { menu, items }))
            })
        })
        .await
    }

    async fn toggle_menu_active(&self, id: i32) -> OrderResult<Option<MenuRow>> {
        let mut conn = self.pool.get().await?;
        Ok(repository::toggle_menu_active(&mut conn, id).await?)
    }
}
