//! Restaurant, branch and menu management.
//!
//! Admins register restaurants for an owner; the owner then manages that
//! restaurant's branches and their menus. Menus are public to read.

use std::collections::BTreeSet;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::Serialize;
use shared::{
    AuthPrincipal, CreateBranchRequest, CreateMenuRequest, CreateRestaurantRequest,
    EditMenuRequest, MenuItemRequest, Role, UpdateBranchRequest, UpdateRestaurantRequest,
};
use tracing::info;

use crate::error::{OrderError, OrderResult};
use crate::guard;
use crate::models::*;
use crate::pricing::MIN_ADDRESS_LEN;
use crate::store::{CatalogStore, MenuDraft, MenuEdit, MenuItemDraft};

pub const MIN_RESTAURANT_NAME_LEN: usize = 2;
pub const MIN_MENU_NAME_LEN: usize = 3;
/// `menu_items.price` is `NUMERIC(10, 2)`.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantBranches {
    pub restaurant: RestaurantRow,
    pub branches: Vec<BranchRow>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn create_restaurant(
        &self,
        principal: &AuthPrincipal,
        request: CreateRestaurantRequest,
    ) -> OrderResult<RestaurantRow> {
        guard::require_role(principal, &[Role::Admin])?;
        if request.user_id <= 0 {
            return Err(OrderError::validation("user_id must be a positive integer"));
        }
        let name = required_text("name", &request.name, MIN_RESTAURANT_NAME_LEN)?;

        let restaurant = self
            .store
            .insert_restaurant(NewRestaurant {
                user_id: request.user_id,
                name,
                description: optional_text(request.description),
            })
            .await?;
        info!(
            "Restaurant {} created for owner {}",
            restaurant.id, restaurant.user_id
        );
        Ok(restaurant)
    }

    pub async fn list_restaurants(&self, principal: &AuthPrincipal) -> OrderResult<Vec<RestaurantRow>> {
        guard::require_role(principal, &[Role::Admin])?;
        self.store.restaurants().await
    }

    pub async fn get_restaurant(
        &self,
        principal: &AuthPrincipal,
        id: i32,
    ) -> OrderResult<RestaurantRow> {
        guard::require_role(principal, &[Role::Admin])?;
        self.restaurant(id).await
    }

    /// Admins may edit any restaurant, owners only their own.
    pub async fn update_restaurant(
        &self,
        principal: &AuthPrincipal,
        id: i32,
        request: UpdateRestaurantRequest,
    ) -> OrderResult<RestaurantRow> {
        guard::require_role(principal, &[Role::Admin, Role::RestaurantOwner])?;
        let changes = RestaurantChanges {
            name: request
                .name
                .map(|name| required_text("name", &name, MIN_RESTAURANT_NAME_LEN))
                .transpose()?,
            description: optional_text(request.description),
        };
        if changes == RestaurantChanges::default() {
            return Err(OrderError::validation("Nothing to update"));
        }

        let restaurant = self.restaurant(id).await?;
        if principal.role == Role::RestaurantOwner && restaurant.user_id != principal.user_id {
            return Err(OrderError::forbidden());
        }

        self.store
            .update_restaurant(id, changes)
            .await?
            .ok_or_else(|| OrderError::not_found("Restaurant"))
    }

    pub async fn restaurant_branches(
        &self,
        principal: &AuthPrincipal,
        id: i32,
    ) -> OrderResult<RestaurantBranches> {
        guard::require_role(principal, &[Role::Admin])?;
        let restaurant = self.restaurant(id).await?;
        let branches = self.store.branches_of(id).await?;
        Ok(RestaurantBranches { restaurant, branches })
    }

    pub async fn create_branch(
        &self,
        principal: &AuthPrincipal,
        request: CreateBranchRequest,
    ) -> OrderResult<BranchRow> {
        guard::require_role(principal, &[Role::RestaurantOwner])?;
        let address = required_text("address", &request.address, MIN_ADDRESS_LEN)?;
        let city = required_text("city", &request.city, 1)?;

        let restaurant = self.restaurant(request.restaurant_id).await?;
        if restaurant.user_id != principal.user_id {
            return Err(OrderError::Forbidden(
                "You are not the owner of this restaurant".to_string(),
            ));
        }

        let branch = self
            .store
            .insert_branch(NewBranch {
                restaurant_id: restaurant.id,
                address,
                city,
            })
            .await?;
        info!("Branch {} opened for restaurant {}", branch.id, restaurant.id);
        Ok(branch)
    }

    pub async fn update_branch(
        &self,
        principal: &AuthPrincipal,
        branch_id: i32,
        request: UpdateBranchRequest,
    ) -> OrderResult<BranchRow> {
        guard::require_role(principal, &[Role::RestaurantOwner])?;
        if request.avg_waiting_time.is_some_and(|minutes| minutes < 0) {
            return Err(OrderError::validation("avg_waiting_time must not be negative"));
        }
        let changes = BranchChanges {
            address: request
                .address
                .map(|address| required_text("address", &address, MIN_ADDRESS_LEN))
                .transpose()?,
            city: request
                .city
                .map(|city| required_text("city", &city, 1))
                .transpose()?,
            avg_waiting_time: request.avg_waiting_time,
            active: request.active,
        };
        if changes == BranchChanges::default() {
            return Err(OrderError::validation("Nothing to update"));
        }

        guard::ensure_branch_owner(self.store.as_ref(), principal, branch_id).await?;
        self.store
            .update_branch(branch_id, changes)
            .await?
            .ok_or_else(|| OrderError::not_found("Branch"))
    }

    pub async fn toggle_branch(
        &self,
        principal: &AuthPrincipal,
        branch_id: i32,
    ) -> OrderResult<BranchRow> {
        guard::require_role(principal, &[Role::RestaurantOwner])?;
        guard::ensure_branch_owner(self.store.as_ref(), principal, branch_id).await?;

        let branch = self
            .store
            .toggle_branch_active(branch_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Branch"))?;
        info!("Branch {} active: {}", branch.id, branch.active);
        Ok(branch)
    }

    pub async fn create_menu(
        &self,
        principal: &AuthPrincipal,
        branch_id: i32,
        request: CreateMenuRequest,
    ) -> OrderResult<StoredMenu> {
        guard::require_role(principal, &[Role::RestaurantOwner])?;
        let name = required_text("name", &request.name, MIN_MENU_NAME_LEN)?;
        let items = item_drafts(request.items)?;

        guard::ensure_branch_owner(self.store.as_ref(), principal, branch_id).await?;
        let stored = self
            .store
            .insert_menu(MenuDraft {
                menu: NewMenu { branch_id, name },
                items,
            })
            .await?;
        info!(
            "Menu {} created for branch {} with {} items",
            stored.menu.id,
            branch_id,
            stored.items.len()
        );
        Ok(stored)
    }

    /// Public listing of a branch's menus, inactive ones included.
    pub async fn branch_menus(&self, branch_id: i32) -> OrderResult<Vec<StoredMenu>> {
        let menus = self.store.menus_of(branch_id).await?;
        if menus.is_empty() {
            return Err(OrderError::not_found("Menus for this branch"));
        }
        Ok(menus)
    }

    pub async fn edit_menu(
        &self,
        principal: &AuthPrincipal,
        branch_id: i32,
        menu_id: i32,
        request: EditMenuRequest,
    ) -> OrderResult<StoredMenu> {
        guard::require_role(principal, &[Role::RestaurantOwner])?;
        let edit = MenuEdit {
            changes: MenuChanges {
                name: request
                    .name
                    .map(|name| required_text("name", &name, MIN_MENU_NAME_LEN))
                    .transpose()?,
                active: request.active,
            },
            add: item_drafts(request.add)?,
            delete: request
                .delete
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        if edit == MenuEdit::default() {
            return Err(OrderError::validation("Nothing to update"));
        }

        self.ensure_branch_menu(principal, branch_id, menu_id).await?;
        self.store
            .edit_menu(menu_id, edit)
            .await?
            .ok_or_else(|| OrderError::not_found("Menu"))
    }

    pub async fn toggle_menu(
        &self,
        principal: &AuthPrincipal,
        branch_id: i32,
        menu_id: i32,
    ) -> OrderResult<MenuRow> {
        guard::require_role(principal, &[Role::RestaurantOwner])?;
        self.ensure_branch_menu(principal, branch_id, menu_id).await?;

        let menu = self
            .store
            .toggle_menu_active(menu_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Menu"))?;
        info!("Menu {} active: {}", menu.id, menu.active);
        Ok(menu)
    }

    async fn restaurant(&self, id: i32) -> OrderResult<RestaurantRow> {
        self.store
            .restaurant(id)
            .await?
            .ok_or_else(|| OrderError::not_found("Restaurant"))
    }

    /// Ownership of the menu, and the menu must sit under the addressed branch.
    async fn ensure_branch_menu(
        &self,
        principal: &AuthPrincipal,
        branch_id: i32,
        menu_id: i32,
    ) -> OrderResult<MenuOwner> {
        let menu = guard::ensure_menu_owner(self.store.as_ref(), principal, menu_id).await?;
        if menu.branch_id != branch_id {
            return Err(OrderError::not_found("Menu"));
        }
        Ok(menu)
    }
}

fn required_text(field: &str, value: &str, min_len: usize) -> OrderResult<String> {
    let value = value.trim();
    if value.chars().count() < min_len.max(1) {
        return Err(OrderError::validation(format!(
            "{} must be at least {} characters",
            field,
            min_len.max(1)
        )));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn max_price() -> BigDecimal {
    BigDecimal::new(MAX_PRICE_CENTS.into(), 2)
}

fn item_drafts(items: Vec<MenuItemRequest>) -> OrderResult<Vec<MenuItemDraft>> {
    items
        .into_iter()
        .map(|item| {
            let name = required_text("item name", &item.name, 1)?;
            if item.price <= BigDecimal::zero() || item.price > max_price() {
                return Err(OrderError::validation(format!(
                    "Price of {} must be greater than 0 and at most {}",
                    name,
                    max_price()
                )));
            }
            Ok(MenuItemDraft {
                name,
                description: optional_text(item.description),
                price: item.price.with_scale(2),
                available: item.available.unwrap_or(true),
            })
        })
        .collect()
}
