//! In-memory [`OrderStore`] and [`CatalogStore`] for tests. Writes are staged on a copy of the
//! state and swapped in only when the whole unit succeeds.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use shared::OrderStatus;
use uuid::Uuid;

use super::{
    CatalogStore, MenuDraft, MenuEdit, MenuItemDraft, OrderDraft, OrderFilter, OrderStore, Stamp,
    TransitionUpdate,
};
use crate::error::{OrderError, OrderResult};
use crate::models::*;

pub const OWNER: i32 = 10;
pub const OTHER_OWNER: i32 = 20;
pub const CUSTOMER: i32 = 100;
pub const OTHER_CUSTOMER: i32 = 101;
pub const ADMIN: i32 = 1;

#[derive(Default, Clone)]
struct State {
    restaurants: BTreeMap<i32, RestaurantRow>,
    branches: BTreeMap<i32, BranchRow>,
    menus: BTreeMap<i32, MenuRow>,
    menu_items: BTreeMap<i32, MenuItemRow>,
    orders: Vec<StoredOrder>,
    idempotency: HashMap<String, IdempotencyRecord>,
    next_catalog_id: i32,
    next_order_id: i32,
    next_item_id: i32,
}

impl State {
    /// Serial ids for catalog rows; seeded rows use small explicit ids.
    fn catalog_id(&mut self) -> i32 {
        self.next_catalog_id = self.next_catalog_id.max(100) + 1;
        self.next_catalog_id
    }

    fn branch_owner(&self, branch_id: i32) -> Option<BranchOwner> {
        let branch = self.branches.get(&branch_id)?;
        let restaurant = self.restaurants.get(&branch.restaurant_id)?;
        Some(BranchOwner {
            branch_id,
            owner_id: restaurant.user_id,
            avg_waiting_time: branch.avg_waiting_time,
            active: branch.active,
        })
    }

    fn menu_owner(&self, menu_id: i32) -> Option<MenuOwner> {
        let menu = self.menus.get(&menu_id)?;
        let branch = self.branch_owner(menu.branch_id)?;
        Some(MenuOwner {
            menu_id,
            branch_id: branch.branch_id,
            owner_id: branch.owner_id,
        })
    }

    fn stored_menu(&self, menu: &MenuRow) -> StoredMenu {
        StoredMenu {
            menu: menu.clone(),
            items: self
                .menu_items
                .values()
                .filter(|item| item.menu_id == menu.id)
                .cloned()
                .collect(),
        }
    }

    fn add_items(&mut self, menu_id: i32, drafts: &[MenuItemDraft]) -> Vec<MenuItemRow> {
        drafts
            .iter()
            .map(|draft| {
                let new = draft.for_menu(menu_id);
                let row = MenuItemRow {
                    id: self.catalog_id(),
                    menu_id: new.menu_id,
                    name: new.name,
                    description: new.description,
                    price: new.price,
                    available: new.available,
                };
                self.menu_items.insert(row.id, row.clone());
                row
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_item_inserts: AtomicBool,
    fail_reads: AtomicBool,
}

pub fn price(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

impl MemoryStore {
    /// Restaurant 1 (owner 10) runs branch 1 (10 min) serving menu 1; restaurant 2
    /// (owner 20) runs branch 2 (5 min) serving menu 2.
    /// Items: 1 Burger 5.00, 2 Pizza 8.00, 3 Soup 4.50 (unavailable), 4 Taco 3.00 (branch 2).
    pub fn marketplace() -> Self {
        let store = Self::default();
        store.add_restaurant(1, OWNER);
        store.add_restaurant(2, OTHER_OWNER);
        store.add_branch(1, 1, 10);
        store.add_branch(2, 2, 5);
        store.add_menu(1, 1);
        store.add_menu(2, 2);
        store.add_menu_item(1, 1, "Burger", "5.00", true);
        store.add_menu_item(2, 1, "Pizza", "8.00", true);
        store.add_menu_item(3, 1, "Soup", "4.50", false);
        store.add_menu_item(4, 2, "Taco", "3.00", true);
        store
    }

    pub fn add_restaurant(&self, id: i32, user_id: i32) {
        self.state.lock().unwrap().restaurants.insert(
            id,
            RestaurantRow {
                id,
                user_id,
                name: format!("Restaurant {}", id),
                description: None,
                created_at: Utc::now(),
            },
        );
    }

    pub fn add_branch(&self, id: i32, restaurant_id: i32, avg_waiting_time: i32) {
        self.state.lock().unwrap().branches.insert(
            id,
            BranchRow {
                id,
                restaurant_id,
                address: format!("Branch street {}", id),
                city: "Springfield".to_string(),
                avg_waiting_time,
                active: true,
                created_at: Utc::now(),
            },
        );
    }

    pub fn add_menu(&self, id: i32, branch_id: i32) {
        self.state.lock().unwrap().menus.insert(
            id,
            MenuRow {
                id,
                branch_id,
                name: format!("Menu {}", id),
                active: true,
                created_at: Utc::now(),
            },
        );
    }

    pub fn add_menu_item(&self, id: i32, menu_id: i32, name: &str, unit_price: &str, available: bool) {
        self.state.lock().unwrap().menu_items.insert(
            id,
            MenuItemRow {
                id,
                menu_id,
                name: name.to_string(),
                description: None,
                price: price(unit_price),
                available,
            },
        );
    }

    pub fn set_branch_active(&self, id: i32, active: bool) {
        if let Some(branch) = self.state.lock().unwrap().branches.get_mut(&id) {
            branch.active = active;
        }
    }

    pub fn set_menu_active(&self, id: i32, active: bool) {
        if let Some(menu) = self.state.lock().unwrap().menus.get_mut(&id) {
            menu.active = active;
        }
    }

    pub fn set_price(&self, id: i32, unit_price: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.menu_items.get_mut(&id) {
            item.price = price(unit_price);
        }
    }

    /// Stores an order directly in the given status, bypassing the writer.
    pub fn seed_order(&self, customer_id: i32, branch_id: i32, status: OrderStatus) -> Uuid {
        let mut state = self.state.lock().unwrap();
        state.next_order_id += 1;
        let now = Utc::now();
        let public_id = Uuid::new_v4();
        let order = OrderRow {
            id: state.next_order_id,
            public_id,
            customer_id,
            branch_id,
            delivery_address: "Seeded street 1".to_string(),
            status: status.as_str().to_string(),
            total: price("10.00"),
            payment_method: "cash".to_string(),
            paid: false,
            created_at: now,
            estimated_ready_at: now + Duration::minutes(15),
            accepted_at: None,
            prepared_at: None,
            sent_at: None,
            delivered_at: None,
            paid_at: None,
            cancelled_at: None,
        };
        state.orders.push(StoredOrder { order, items: Vec::new() });
        public_id
    }

    pub fn fail_item_inserts(&self) {
        self.fail_item_inserts.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    pub fn item_count(&self) -> usize {
        self.state.lock().unwrap().orders.iter().map(|o| o.items.len()).sum()
    }

    pub fn stored(&self, public_id: Uuid) -> Option<StoredOrder> {
        self.state
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.order.public_id == public_id)
            .cloned()
    }

    fn check_reads(&self) -> OrderResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn stamp_slot(order: &mut OrderRow, stamp: Stamp) -> &mut Option<chrono::DateTime<Utc>> {
    match stamp {
        Stamp::Accepted => &mut order.accepted_at,
        Stamp::Prepared => &mut order.prepared_at,
        Stamp::Sent => &mut order.sent_at,
        Stamp::Delivered => &mut order.delivered_at,
        Stamp::Paid => &mut order.paid_at,
        Stamp::Cancelled => &mut order.cancelled_at,
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn branch_owner(&self, branch_id: i32) -> OrderResult<Option<BranchOwner>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().branch_owner(branch_id))
    }

    async fn menu_owner(&self, menu_id: i32) -> OrderResult<Option<MenuOwner>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().menu_owner(menu_id))
    }

    async fn menu_items(&self, ids: &[i32]) -> OrderResult<Vec<MenuItemInfo>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .menu_items
            .values()
            .filter(|item| ids.contains(&item.id))
            .filter_map(|item| {
                let menu = state.menus.get(&item.menu_id)?;
                Some(MenuItemInfo {
                    id: item.id,
                    name: item.name.clone(),
                    price: item.price.clone(),
                    available: item.available,
                    branch_id: menu.branch_id,
                    menu_active: menu.active,
                })
            })
            .collect())
    }

    async fn idempotency(&self, key: &str) -> OrderResult<Option<IdempotencyRecord>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().idempotency.get(key).cloned())
    }

    async fn insert_order(&self, draft: OrderDraft) -> OrderResult<StoredOrder> {
        let mut state = self.state.lock().unwrap();
        let mut staged = state.clone();

        if staged
            .orders
            .iter()
            .any(|o| o.order.public_id == draft.order.public_id)
        {
            return Err(OrderError::Conflict("Duplicate entry: orders_public_id_key".into()));
        }

        staged.next_order_id += 1;
        let new = draft.order;
        let order = OrderRow {
            id: staged.next_order_id,
            public_id: new.public_id,
            customer_id: new.customer_id,
            branch_id: new.branch_id,
            delivery_address: new.delivery_address,
            status: new.status,
            total: new.total,
            payment_method: new.payment_method,
            paid: new.paid,
            created_at: new.created_at,
            estimated_ready_at: new.estimated_ready_at,
            accepted_at: new.accepted_at,
            prepared_at: None,
            sent_at: None,
            delivered_at: None,
            paid_at: None,
            cancelled_at: None,
        };

        if self.fail_item_inserts.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("order_items insert failed".to_string()));
        }

        let mut items = Vec::with_capacity(draft.items.len());
        for line in draft.items {
            staged.next_item_id += 1;
            items.push(OrderItemRow {
                id: staged.next_item_id,
                order_id: order.id,
                menu_item_id: line.menu_item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        if let Some(entry) = draft.idempotency {
            if staged.idempotency.contains_key(&entry.key) {
                return Err(OrderError::Duplicate(entry.key));
            }
            staged.idempotency.insert(
                entry.key.clone(),
                IdempotencyRecord {
                    key: entry.key,
                    request_hash: entry.request_hash,
                    order_id: order.id,
                    response: entry.response,
                    created_at: Utc::now(),
                },
            );
        }

        let stored = StoredOrder { order, items };
        staged.orders.push(stored.clone());
        *state = staged;
        Ok(stored)
    }

    async fn order(&self, public_id: Uuid) -> OrderResult<Option<StoredOrder>> {
        self.check_reads()?;
        Ok(self.stored(public_id))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> OrderResult<Vec<OrderRow>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<OrderRow> = state
            .orders
            .iter()
            .map(|o| o.order.clone())
            .filter(|o| filter.customer_id.map_or(true, |c| o.customer_id == c))
            .filter(|o| filter.branch_id.map_or(true, |b| o.branch_id == b))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn apply_transition(&self, update: &TransitionUpdate) -> OrderResult<Option<OrderRow>> {
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state
            .orders
            .iter_mut()
            .find(|o| o.order.public_id == update.public_id)
        else {
            return Ok(None);
        };

        let order = &mut stored.order;
        let in_from = update.from.iter().any(|s| s.as_str() == order.status);
        if !in_from || order.paid || stamp_slot(order, update.stamp).is_some() {
            return Ok(None);
        }

        order.status = update.to.as_str().to_string();
        *stamp_slot(order, update.stamp) = Some(update.at);
        if update.stamp == Stamp::Paid {
            order.paid = true;
        }
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_restaurant(&self, restaurant: NewRestaurant) -> OrderResult<RestaurantRow> {
        let mut state = self.state.lock().unwrap();
        let row = RestaurantRow {
            id: state.catalog_id(),
            user_id: restaurant.user_id,
            name: restaurant.name,
            description: restaurant.description,
            created_at: Utc::now(),
        };
        state.restaurants.insert(row.id, row.clone());
        Ok(row)
    }

    async fn restaurants(&self) -> OrderResult<Vec<RestaurantRow>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<RestaurantRow> = state.restaurants.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn restaurant(&self, id: i32) -> OrderResult<Option<RestaurantRow>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().restaurants.get(&id).cloned())
    }

    async fn update_restaurant(
        &self,
        id: i32,
        changes: RestaurantChanges,
    ) -> OrderResult<Option<RestaurantRow>> {
        let mut state = self.state.lock().unwrap();
        let Some(row) = state.restaurants.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(description) = changes.description {
            row.description = Some(description);
        }
        Ok(Some(row.clone()))
    }

    async fn branches_of(&self, restaurant_id: i32) -> OrderResult<Vec<BranchRow>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .branches
            .values()
            .filter(|branch| branch.restaurant_id == restaurant_id)
            .cloned()
            .collect())
    }

    async fn insert_branch(&self, branch: NewBranch) -> OrderResult<BranchRow> {
        let mut state = self.state.lock().unwrap();
        if !state.restaurants.contains_key(&branch.restaurant_id) {
            return Err(OrderError::validation(
                "Foreign key constraint failed: branches_restaurant_id_fkey",
            ));
        }
        let row = BranchRow {
            id: state.catalog_id(),
            restaurant_id: branch.restaurant_id,
            address: branch.address,
            city: branch.city,
            avg_waiting_time: 0,
            active: true,
            created_at: Utc::now(),
        };
        state.branches.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_branch(&self, id: i32, changes: BranchChanges) -> OrderResult<Option<BranchRow>> {
        let mut state = self.state.lock().unwrap();
        let Some(row) = state.branches.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(address) = changes.address {
            row.address = address;
        }
        if let Some(city) = changes.city {
            row.city = city;
        }
        if let Some(avg_waiting_time) = changes.avg_waiting_time {
            row.avg_waiting_time = avg_waiting_time;
        }
        if let Some(active) = changes.active {
            row.active = active;
        }
        Ok(Some(row.clone()))
    }

    async fn toggle_branch_active(&self, id: i32) -> OrderResult<Option<BranchRow>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.branches.get_mut(&id).map(|row| {
            row.active = !row.active;
            row.clone()
        }))
    }

    async fn insert_menu(&self, draft: MenuDraft) -> OrderResult<StoredMenu> {
        let mut state = self.state.lock().unwrap();
        if !state.branches.contains_key(&draft.menu.branch_id) {
            return Err(OrderError::validation(
                "Foreign key constraint failed: menus_branch_id_fkey",
            ));
        }
        let mut staged = state.clone();
        let menu = MenuRow {
            id: staged.catalog_id(),
            branch_id: draft.menu.branch_id,
            name: draft.menu.name,
            active: true,
            created_at: Utc::now(),
        };
        staged.menus.insert(menu.id, menu.clone());

        if self.fail_item_inserts.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("menu_items insert failed".to_string()));
        }
        let items = staged.add_items(menu.id, &draft.items);

        *state = staged;
        Ok(StoredMenu { menu, items })
    }

    async fn menus_of(&self, branch_id: i32) -> OrderResult<Vec<StoredMenu>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let mut menus: Vec<&MenuRow> = state
            .menus
            .values()
            .filter(|menu| menu.branch_id == branch_id)
            .collect();
        menus.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(menus.into_iter().map(|menu| state.stored_menu(menu)).collect())
    }

    async fn edit_menu(&self, menu_id: i32, edit: MenuEdit) -> OrderResult<Option<StoredMenu>> {
        let mut state = self.state.lock().unwrap();
        let mut staged = state.clone();
        let Some(menu) = staged.menus.get_mut(&menu_id) else {
            return Ok(None);
        };
        if let Some(name) = edit.changes.name {
            menu.name = name;
        }
        if let Some(active) = edit.changes.active {
            menu.active = active;
        }
        let menu = menu.clone();

        let delete: BTreeSet<i32> = edit.delete.into_iter().collect();
        let owned = delete
            .iter()
            .all(|id| staged.menu_items.get(id).is_some_and(|item| item.menu_id == menu_id));
        if !owned {
            return Err(OrderError::validation(
                "One or more menu items do not belong to this menu",
            ));
        }
        let referenced = staged
            .orders
            .iter()
            .flat_map(|o| &o.items)
            .any(|line| delete.contains(&line.menu_item_id));
        if referenced {
            return Err(OrderError::validation(
                "Foreign key constraint failed: order_items_menu_item_id_fkey",
            ));
        }
        for id in &delete {
            staged.menu_items.remove(id);
        }
        staged.add_items(menu_id, &edit.add);

        let stored = staged.stored_menu(&menu);
        *state = staged;
        Ok(Some(stored))
    }

    async fn toggle_menu_active(&self, id: i32) -> OrderResult<Option<MenuRow>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.menus.get_mut(&id).map(|row| {
            row.active = !row.active;
            row.clone()
        }))
    }
}
