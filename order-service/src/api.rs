use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::{
    AuthPrincipal, CreateBranchRequest, CreateMenuRequest, CreateOrderRequest,
    CreateRestaurantRequest, EditMenuRequest, OrderAction, OrderLineView, OrderView,
    UpdateBranchRequest, UpdateRestaurantRequest,
};
use uuid::Uuid;

use crate::catalog::CatalogService;
use crate::error::{OrderError, OrderResult};
use crate::service::{ListQuery, OrderService, SubmitOutcome};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub catalog: Arc<CatalogService>,
}

/// Principal forwarded by the gateway after it authenticated the caller.
pub struct Caller(pub AuthPrincipal);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = OrderError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(&parts.headers, USER_ID_HEADER)?
            .parse::<i32>()
            .map_err(|_| OrderError::Unauthenticated(format!("Invalid {} header", USER_ID_HEADER)))?;
        let role = header(&parts.headers, USER_ROLE_HEADER)?
            .parse()
            .map_err(OrderError::Unauthenticated)?;
        Ok(Caller(AuthPrincipal { user_id, role }))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> OrderResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OrderError::Unauthenticated(format!("Missing {} header", name)))
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    Pending {
        status: &'static str,
        order_id: Uuid,
    },
    AlreadyExists {
        status: &'static str,
        order_id: Uuid,
        order: OrderView,
        items: Vec<OrderLineView>,
    },
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub customer_id: Option<i32>,
    pub branch_id: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/:action", patch(transition_order))
        .route("/restaurants", get(list_restaurants).post(create_restaurant))
        .route("/restaurants/:id", get(get_restaurant).patch(update_restaurant))
        .route("/restaurants/:id/branches", get(restaurant_branches))
        .route("/branches", post(create_branch))
        .route("/branches/:id", patch(update_branch))
        .route("/branches/:id/active", patch(toggle_branch))
        .route("/branches/:id/menu", get(branch_menus).post(create_menu))
        .route("/branches/:id/menu/:menu_id", patch(edit_menu))
        .route("/branches/:id/menu/:menu_id/active", patch(toggle_menu))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    headers: HeaderMap,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> OrderResult<Response> {
    let Json(request) = payload?;
    let key = headers.get(IDEMPOTENCY_HEADER).and_then(|v| v.to_str().ok());

    let response = match state.service.submit_order(&principal, request, key).await? {
        SubmitOutcome::Accepted { order_id } => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse::Pending {
                status: "pending",
                order_id,
            }),
        ),
        SubmitOutcome::AlreadyExists(prior) => (
            StatusCode::OK,
            Json(SubmitResponse::AlreadyExists {
                status: "already exists",
                order_id: prior.order_id,
                order: prior.receipt.order,
                items: prior.receipt.items,
            }),
        ),
    };
    Ok(response.into_response())
}

pub async fn list_orders(
    State(state): State<AppState>,
    Caller(principal): Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> OrderResult<impl IntoResponse> {
    let Query(params) = params?;
    let query = ListQuery {
        customer_id: params.customer_id,
        branch_id: params.branch_id,
        limit: params.limit,
        offset: params.offset,
    };
    Ok(Json(state.service.list_orders(&principal, query).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> OrderResult<impl IntoResponse> {
    let public_id = parse_order_id(&id)?;
    Ok(Json(state.service.get_order(&principal, public_id).await?))
}

pub async fn transition_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((id, action)): Path<(String, String)>,
) -> OrderResult<impl IntoResponse> {
    let public_id = parse_order_id(&id)?;
    let action: OrderAction = action
        .parse()
        .map_err(|_| OrderError::NotFound(format!("Action {}", action)))?;
    Ok(Json(state.service.transition(&principal, public_id, action).await?))
}

pub async fn create_restaurant(
    State(state): State<AppState>,
    Caller(principal): Caller,
    payload: Result<Json<CreateRestaurantRequest>, JsonRejection>,
) -> OrderResult<impl IntoResponse> {
    let Json(request) = payload?;
    let restaurant = state.catalog.create_restaurant(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(restaurant)))
}

pub async fn list_restaurants(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> OrderResult<impl IntoResponse> {
    Ok(Json(state.catalog.list_restaurants(&principal).await?))
}

pub async fn get_restaurant(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> OrderResult<impl IntoResponse> {
    let id = parse_id("restaurant", &id)?;
    Ok(Json(state.catalog.get_restaurant(&principal, id).await?))
}

pub async fn update_restaurant(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateRestaurantRequest>, JsonRejection>,
) -> OrderResult<impl IntoResponse> {
    let id = parse_id("restaurant", &id)?;
    let Json(request) = payload?;
    Ok(Json(state.catalog.update_restaurant(&principal, id, request).await?))
}

pub async fn restaurant_branches(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> OrderResult<impl IntoResponse> {
    let id = parse_id("restaurant", &id)?;
    Ok(Json(state.catalog.restaurant_branches(&principal, id).await?))
}

pub async fn create_branch(
    State(state): State<AppState>,
    Caller(principal): Caller,
    payload: Result<Json<CreateBranchRequest>, JsonRejection>,
) -> OrderResult<impl IntoResponse> {
    let Json(request) = payload?;
    let branch = state.catalog.create_branch(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(branch)))
}

pub async fn update_branch(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBranchRequest>, JsonRejection>,
) -> OrderResult<impl IntoResponse> {
    let branch_id = parse_id("branch", &id)?;
    let Json(request) = payload?;
    Ok(Json(state.catalog.update_branch(&principal, branch_id, request).await?))
}

pub async fn toggle_branch(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> OrderResult<impl IntoResponse> {
    let branch_id = parse_id("branch", &id)?;
    Ok(Json(state.catalog.toggle_branch(&principal, branch_id).await?))
}

/// Menus are public; no principal is required.
pub async fn branch_menus(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> OrderResult<impl IntoResponse> {
    let branch_id = parse_id("branch", &id)?;
    Ok(Json(state.catalog.branch_menus(branch_id).await?))
}

pub async fn create_menu(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    payload: Result<Json<CreateMenuRequest>, JsonRejection>,
) -> OrderResult<impl IntoResponse> {
    let branch_id = parse_id("branch", &id)?;
    let Json(request) = payload?;
    let menu = state.catalog.create_menu(&principal, branch_id, request).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

pub async fn edit_menu(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((id, menu_id)): Path<(String, String)>,
    payload: Result<Json<EditMenuRequest>, JsonRejection>,
) -> OrderResult<impl IntoResponse> {
    let branch_id = parse_id("branch", &id)?;
    let menu_id = parse_id("menu", &menu_id)?;
    let Json(request) = payload?;
    Ok(Json(
        state
            .catalog
            .edit_menu(&principal, branch_id, menu_id, request)
            .await?,
    ))
}

pub async fn toggle_menu(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((id, menu_id)): Path<(String, String)>,
) -> OrderResult<impl IntoResponse> {
    let branch_id = parse_id("branch", &id)?;
    let menu_id = parse_id("menu", &menu_id)?;
    Ok(Json(
        state
            .catalog
            .toggle_menu(&principal, branch_id, menu_id)
            .await?,
    ))
}

pub async fn health_check() -> &'static str {
    "OK"
}

fn parse_order_id(raw: &str) -> OrderResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| OrderError::validation(format!("Invalid order id: {}", raw)))
}

fn parse_id(resource: &str, raw: &str) -> OrderResult<i32> {
    raw.parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| OrderError::validation(format!("Invalid {} id: {}", resource, raw)))
}
