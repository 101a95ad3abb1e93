use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use serde::Serialize;
use shared::OrderStatus;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    Conflict(String),

    #[error("idempotency key {0} is already recorded")]
    Duplicate(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type OrderResult<T> = Result<T, OrderError>;

impl OrderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("Forbidden".to_string())
    }

    /// Infrastructure failures a queue may retry. Business rejections are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::Internal(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::NotFound(_) => "not_found",
            OrderError::Forbidden(_) => "authorization",
            OrderError::Unauthenticated(_) => "authentication",
            OrderError::InvalidTransition { .. } => "state",
            OrderError::Conflict(_) | OrderError::Duplicate(_) => "conflict",
            OrderError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::Validation(_) | OrderError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Forbidden(_) => StatusCode::FORBIDDEN,
            OrderError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            OrderError::Conflict(_) | OrderError::Duplicate(_) => StatusCode::CONFLICT,
            OrderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DieselError> for OrderError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => OrderError::not_found("Record"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                OrderError::Conflict(format!("Duplicate entry: {}", info.message()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                OrderError::Validation(format!(
                    "Foreign key constraint failed: {}",
                    info.message()
                ))
            }
            DieselError::DatabaseError(
                DatabaseErrorKind::CheckViolation | DatabaseErrorKind::NotNullViolation,
                info,
            ) => OrderError::Validation(format!("Constraint failed: {}", info.message())),
            // SQLSTATE 22003 has no dedicated kind in diesel
            DieselError::DatabaseError(_, info) if info.message().contains("numeric field overflow") => {
                OrderError::Validation(format!("Value out of range: {}", info.message()))
            }
            other => OrderError::Internal(other.to_string()),
        }
    }
}

impl From<bb8::RunError<PoolError>> for OrderError {
    fn from(e: bb8::RunError<PoolError>) -> Self {
        OrderError::Internal(format!("connection pool: {}", e))
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(e: serde_json::Error) -> Self {
        OrderError::Internal(format!("serialization: {}", e))
    }
}

impl From<JsonRejection> for OrderError {
    fn from(rejection: JsonRejection) -> Self {
        OrderError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for OrderError {
    fn from(rejection: QueryRejection) -> Self {
        OrderError::Validation(rejection.body_text())
    }
}

impl From<rdkafka::error::KafkaError> for OrderError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        OrderError::Internal(format!("queue: {}", e))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if let OrderError::Internal(detail) = &self {
            error!("Internal error: {}", detail);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            status: "error",
            kind: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
