use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::Transaction;
use crate::models::*;
use crate::schema::*;
use crate::store::{OrderFilter, Stamp, TransitionUpdate};

pub async fn branch_owner(
    conn: &mut AsyncPgConnection,
    branch_id: i32,
) -> QueryResult<Option<BranchOwner>> {
    branches::table
        .inner_join(restaurants::table)
        .filter(branches::id.eq(branch_id))
        .select((
            branches::id,
            restaurants::user_id,
            branches::avg_waiting_time,
            branches::active,
        ))
        .first::<BranchOwner>(conn)
        .await
        .optional()
}

pub async fn menu_owner(
    conn: &mut AsyncPgConnection,
    menu_id: i32,
) -> QueryResult<Option<MenuOwner>> {
    menus::table
        .inner_join(branches::table.inner_join(restaurants::table))
        .filter(menus::id.eq(menu_id))
        .select((menus::id, branches::id, restaurants::user_id))
        .first::<MenuOwner>(conn)
        .await
        .optional()
}

pub async fn menu_items_by_ids(
    conn: &mut AsyncPgConnection,
    ids: &[i32],
) -> QueryResult<Vec<MenuItemInfo>> {
    menu_items::table
        .inner_join(menus::table)
        .filter(menu_items::id.eq_any(ids.to_vec()))
        .select((
            menu_items::id,
            menu_items::name,
            menu_items::price,
            menu_items::available,
            menus::branch_id,
            menus::active,
        ))
        .load::<MenuItemInfo>(conn)
        .await
}

pub async fn insert_restaurant(
    conn: &mut AsyncPgConnection,
    new_restaurant: &NewRestaurant,
) -> QueryResult<RestaurantRow> {
    diesel::insert_into(restaurants::table)
        .values(new_restaurant)
        .returning(RestaurantRow::as_returning())
        .get_result(conn)
        .await
}

pub async fn restaurants(conn: &mut AsyncPgConnection) -> QueryResult<Vec<RestaurantRow>> {
    restaurants::table
        .order((restaurants::created_at.desc(), restaurants::id.desc()))
        .select(RestaurantRow::as_select())
        .load(conn)
        .await
}

pub async fn restaurant_by_id(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> QueryResult<Option<RestaurantRow>> {
    restaurants::table
        .find(id)
        .select(RestaurantRow::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn update_restaurant(
    conn: &mut AsyncPgConnection,
    id: i32,
    changes: &RestaurantChanges,
) -> QueryResult<Option<RestaurantRow>> {
    diesel::update(restaurants::table.find(id))
        .set(changes)
        .returning(RestaurantRow::as_returning())
        .get_result(conn)
        .await
        .optional()
}

pub async fn branches_by_restaurant(
    conn: &mut AsyncPgConnection,
    restaurant_id: i32,
) -> QueryResult<Vec<BranchRow>> {
    branches::table
        .filter(branches::restaurant_id.eq(restaurant_id))
        .order(branches::id.asc())
        .select(BranchRow::as_select())
        .load(conn)
        .await
}

pub async fn insert_branch(
    conn: &mut AsyncPgConnection,
    new_branch: &NewBranch,
) -> QueryResult<BranchRow> {
    diesel::insert_into(branches::table)
        .values(new_branch)
        .returning(BranchRow::as_returning())
        .get_result(conn)
        .await
}

pub async fn update_branch(
    conn: &mut AsyncPgConnection,
    id: i32,
    changes: &BranchChanges,
) -> QueryResult<Option<BranchRow>> {
    diesel::update(branches::table.find(id))
        .set(changes)
        .returning(BranchRow::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// Flips `active` in place, so concurrent toggles never lose an update.
pub async fn toggle_branch_active(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> QueryResult<Option<BranchRow>> {
    diesel::update(branches::table.find(id))
        .set(branches::active.eq(diesel::dsl::not(branches::active)))
        .returning(BranchRow::as_returning())
        .get_result(conn)
        .await
        .optional()
}

pub async fn menu_by_id(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<Option<MenuRow>> {
    menus::table
        .find(id)
        .select(MenuRow::as_select())
        .first(conn)
        .await
        .optional()
}

/// Menus of a branch in creation order, each with its items.
pub async fn menus_with_items(
    conn: &mut AsyncPgConnection,
    branch_id: i32,
) -> QueryResult<Vec<StoredMenu>> {
    let menus = menus::table
        .filter(menus::branch_id.eq(branch_id))
        .order((menus::created_at.asc(), menus::id.asc()))
        .select(MenuRow::as_select())
        .load(conn)
        .await?;
    if menus.is_empty() {
        return Ok(Vec::new());
    }

    let items = MenuItemRow::belonging_to(&menus)
        .order(menu_items::id.asc())
        .select(MenuItemRow::as_select())
        .load(conn)
        .await?;

    Ok(items
        .grouped_by(&menus)
        .into_iter()
        .zip(menus)
        .map(|(items, menu)| StoredMenu { menu, items })
        .collect())
}

pub async fn menu_items_of(
    conn: &mut AsyncPgConnection,
    menu_id: i32,
) -> QueryResult<Vec<MenuItemRow>> {
    menu_items::table
        .filter(menu_items::menu_id.eq(menu_id))
        .order(menu_items::id.asc())
        .select(MenuItemRow::as_select())
        .load(conn)
        .await
}

pub async fn insert_menu(tx: &mut Transaction<'_>, new_menu: &NewMenu) -> QueryResult<MenuRow> {
    diesel::insert_into(menus::table)
        .values(new_menu)
        .returning(MenuRow::as_returning())
        .get_result(tx.conn())
        .await
}

pub async fn update_menu(
    tx: &mut Transaction<'_>,
    id: i32,
    changes: &MenuChanges,
) -> QueryResult<Option<MenuRow>> {
    diesel::update(menus::table.find(id))
        .set(changes)
        .returning(MenuRow::as_returning())
        .get_result(tx.conn())
        .await
        .optional()
}

pub async fn insert_menu_items(
    tx: &mut Transaction<'_>,
    items: &[NewMenuItem],
) -> QueryResult<Vec<MenuItemRow>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    diesel::insert_into(menu_items::table)
        .values(items)
        .returning(MenuItemRow::as_returning())
        .get_results(tx.conn())
        .await
}

/// Deletes only items that belong to `menu_id`; returns how many went.
pub async fn delete_menu_items(
    tx: &mut Transaction<'_>,
    menu_id: i32,
    ids: &[i32],
) -> QueryResult<usize> {
    diesel::delete(
        menu_items::table
            .filter(menu_items::menu_id.eq(menu_id))
            .filter(menu_items::id.eq_any(ids.to_vec())),
    )
    .execute(tx.conn())
    .await
}

pub async fn toggle_menu_active(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> QueryResult<Option<MenuRow>> {
    diesel::update(menus::table.find(id))
        .set(menus::active.eq(diesel::dsl::not(menus::active)))
        .returning(MenuRow::as_returning())
        .get_result(conn)
        .await
        .optional()
}

pub async fn idempotency_by_key(
    conn: &mut AsyncPgConnection,
    key: &str,
) -> QueryResult<Option<IdempotencyRecord>> {
    idempotency_keys::table
        .filter(idempotency_keys::key.eq(key))
        .select(IdempotencyRecord::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn order_by_public_id(
    conn: &mut AsyncPgConnection,
    public_id: Uuid,
) -> QueryResult<Option<StoredOrder>> {
    let order = orders::table
        .filter(orders::public_id.eq(public_id))
        .select(OrderRow::as_select())
        .first(conn)
        .await
        .optional()?;

    let Some(order) = order else {
        return Ok(None);
    };

    let items = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .order(order_items::id.asc())
        .select(OrderItemRow::as_select())
        .load(conn)
        .await?;

    Ok(Some(StoredOrder { order, items }))
}

pub async fn list_orders(
    conn: &mut AsyncPgConnection,
    filter: &OrderFilter,
) -> QueryResult<Vec<OrderRow>> {
    let mut query = orders::table.select(OrderRow::as_select()).into_boxed();

    if let Some(customer_id) = filter.customer_id {
        query = query.filter(orders::customer_id.eq(customer_id));
    }
    if let Some(branch_id) = filter.branch_id {
        query = query.filter(orders::branch_id.eq(branch_id));
    }

    query
        .order((orders::created_at.desc(), orders::id.desc()))
        .limit(filter.limit)
        .offset(filter.offset)
        .load(conn)
        .await
}

pub async fn insert_order(tx: &mut Transaction<'_>, new_order: &NewOrder) -> QueryResult<OrderRow> {
    diesel::insert_into(orders::table)
        .values(new_order)
        .returning(OrderRow::as_returning())
        .get_result(tx.conn())
        .await
}

pub async fn insert_order_items(
    tx: &mut Transaction<'_>,
    items: &[NewOrderItem],
) -> QueryResult<Vec<OrderItemRow>> {
    diesel::insert_into(order_items::table)
        .values(items)
        .returning(OrderItemRow::as_returning())
        .get_results(tx.conn())
        .await
}

/// Insert-or-fail: returns the number of rows written, zero when the key already exists.
pub async fn insert_idempotency(
    tx: &mut Transaction<'_>,
    record: &NewIdempotencyRecord,
) -> QueryResult<usize> {
    diesel::insert_into(idempotency_keys::table)
        .values(record)
        .on_conflict(idempotency_keys::key)
        .do_nothing()
        .execute(tx.conn())
        .await
}

/// Conditional status update. Matches only while the order is still in one of
/// the expected states, unpaid, and the target timestamp is unset; `None`
/// means another writer got there first or the transition was already applied.
pub async fn apply_transition(
    conn: &mut AsyncPgConnection,
    update: &TransitionUpdate,
) -> QueryResult<Option<OrderRow>> {
    let from: Vec<&str> = update.from.iter().map(|s| s.as_str()).collect();
    let to = update.to.as_str();
    let at = Some(update.at);

    let target = orders::table
        .filter(orders::public_id.eq(update.public_id))
        .filter(orders::status.eq_any(from))
        .filter(orders::paid.eq(false));

    macro_rules! stamped {
        ($column:expr) => {
            diesel::update(target.filter($column.is_null()))
                .set((orders::status.eq(to), $column.eq(at)))
                .returning(OrderRow::as_returning())
                .get_result(conn)
                .await
                .optional()
        };
    }

    match update.stamp {
        Stamp::Accepted => stamped!(orders::accepted_at),
        Stamp::Prepared => stamped!(orders::prepared_at),
        Stamp::Sent => stamped!(orders::sent_at),
        Stamp::Delivered => stamped!(orders::delivered_at),
        Stamp::Cancelled => stamped!(orders::cancelled_at),
        Stamp::Paid => diesel::update(target.filter(orders::paid_at.is_null()))
            .set((
                orders::status.eq(to),
                orders::paid.eq(true),
                orders::paid_at.eq(at),
            ))
            .returning(OrderRow::as_returning())
            .get_result(conn)
            .await
            .optional(),
    }
}
