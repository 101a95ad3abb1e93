use std::sync::Arc;

use shared::{
    AuthPrincipal, CreateOrderRequest, OrderAction, OrderJob, OrderReceipt, OrderSummary, Role,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::guard;
use crate::idempotency::{self, PriorOrder};
use crate::intake::WorkQueue;
use crate::pricing;
use crate::state_machine;
use crate::store::{OrderFilter, OrderStore};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Enqueued; the order becomes readable once the worker commits it.
    Accepted { order_id: Uuid },
    AlreadyExists(PriorOrder),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub customer_id: Option<i32>,
    pub branch_id: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Entry point for every inbound order operation.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    queue: Arc<dyn WorkQueue>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { store, queue }
    }

    pub async fn submit_order(
        &self,
        principal: &AuthPrincipal,
        request: CreateOrderRequest,
        idempotency_key: Option<&str>,
    ) -> OrderResult<SubmitOutcome> {
        if principal.role != Role::Customer {
            return Err(OrderError::Forbidden(
                "Only customers can place orders".to_string(),
            ));
        }
        pricing::validate_request(&request)?;

        let key = idempotency::normalize_key(idempotency_key)?;
        if let Some(prior) = idempotency::lookup(self.store.as_ref(), key.as_deref()).await? {
            if prior.receipt.order.customer_id != principal.user_id {
                return Err(OrderError::Conflict(
                    "Idempotency key was already used".to_string(),
                ));
            }
            return Ok(SubmitOutcome::AlreadyExists(prior));
        }

        // fail fast on anything the worker would reject anyway
        pricing::price_order(self.store.as_ref(), request.branch_id, &request.items).await?;

        let job = OrderJob::new(principal.user_id, request, key);
        let handle = self.queue.enqueue(&job).await?;
        info!(
            "Order {} enqueued for customer {} (partition {}, offset {})",
            job.public_id, job.customer_id, handle.partition, handle.offset
        );

        Ok(SubmitOutcome::Accepted {
            order_id: job.public_id,
        })
    }

    pub async fn get_order(&self, principal: &AuthPrincipal, public_id: Uuid) -> OrderResult<OrderReceipt> {
        let stored = self
            .store
            .order(public_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Order"))?;
        guard::authorize_view(self.store.as_ref(), principal, &stored.order).await?;
        stored.to_receipt()
    }

    pub async fn list_orders(
        &self,
        principal: &AuthPrincipal,
        query: ListQuery,
    ) -> OrderResult<Vec<OrderSummary>> {
        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(OrderError::validation(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        if offset < 0 {
            return Err(OrderError::validation("offset must not be negative"));
        }

        let mut filter = OrderFilter {
            customer_id: query.customer_id,
            branch_id: query.branch_id,
            limit,
            offset,
        };

        match principal.role {
            Role::Admin => {}
            Role::Customer => filter.customer_id = Some(principal.user_id),
            Role::RestaurantOwner => {
                let branch_id = query.branch_id.ok_or_else(|| {
                    OrderError::validation("Must provide a branch id to look for its orders")
                })?;
                guard::ensure_branch_owner(self.store.as_ref(), principal, branch_id).await?;
            }
        }

        self.store
            .list_orders(&filter)
            .await?
            .iter()
            .map(|row| row.to_summary())
            .collect()
    }

    pub async fn transition(
        &self,
        principal: &AuthPrincipal,
        public_id: Uuid,
        action: OrderAction,
    ) -> OrderResult<OrderReceipt> {
        state_machine::apply(self.store.as_ref(), principal, public_id, action)
            .await?
            .to_receipt()
    }
}
