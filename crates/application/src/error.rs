//! Application error types.

use common::AggregateId;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// How a caller should react to a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced aggregate does not exist.
    NotFound,
    /// A business rule forbids the change in the current state.
    Rejected,
    /// The input is malformed.
    Invalid,
    /// A concurrent update or transient fault; the same command may succeed later.
    RetryLater,
    /// A system fault.
    Fault,
}

/// Errors returned by command handlers and queries.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{aggregate_type} not found: {id}")]
    NotFound {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("Transient store failure: {0}")]
    Transient(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<AppError>,
    },
}

impl AppError {
    pub fn not_found(aggregate_type: &'static str, id: AggregateId) -> Self {
        AppError::NotFound { aggregate_type, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Domain(e) if e.is_validation() => ErrorKind::Invalid,
            AppError::Domain(_) => ErrorKind::Rejected,
            AppError::Validation(_) => ErrorKind::Invalid,
            AppError::Conflict(_) | AppError::Transient(_) => ErrorKind::RetryLater,
            AppError::Store(_) | AppError::RetriesExhausted { .. } => ErrorKind::Fault,
        }
    }

    /// True when re-running the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::Transient(_))
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        if e.is_conflict() {
            AppError::Conflict(e.to_string())
        } else if e.is_transient() {
            AppError::Transient(e)
        } else {
            AppError::Store(e)
        }
    }
}

macro_rules! from_aggregate_error {
    ($($error:ty),+) => {
        $(impl From<$error> for AppError {
            fn from(e: $error) -> Self {
                AppError::Domain(e.into())
            }
        })+
    };
}

from_aggregate_error!(
    domain::OrderError,
    domain::ProductError,
    domain::CustomerError,
    domain::MoneyError
);

/// Convenience type alias for application results.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{OrderError, OrderStatus, ProductError};
    use store::Version;

    #[test]
    fn kinds_are_distinguishable() {
        let id = AggregateId::new();
        assert_eq!(AppError::not_found("Order", id).kind(), ErrorKind::NotFound);

        let rejected: AppError = ProductError::InsufficientStock {
            product_id: id,
            available: 3,
            requested: 5,
        }
        .into();
        assert_eq!(rejected.kind(), ErrorKind::Rejected);

        let invalid: AppError = OrderError::PaymentMismatch {
            expected: domain::Money::usd(10000),
            received: domain::Money::usd(9999),
        }
        .into();
        assert_eq!(invalid.kind(), ErrorKind::Invalid);

        let transition: AppError = OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        }
        .into();
        assert_eq!(transition.kind(), ErrorKind::Rejected);
    }

    #[test]
    fn store_conflicts_are_retryable() {
        let conflict: AppError = StoreError::ConcurrencyConflict {
            aggregate_type: "Product".to_string(),
            aggregate_id: AggregateId::new(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert!(conflict.is_retryable());
        assert_eq!(conflict.kind(), ErrorKind::RetryLater);

        let closed: AppError = StoreError::TransactionClosed.into();
        assert!(!closed.is_retryable());
        assert_eq!(closed.kind(), ErrorKind::Fault);
    }

    #[test]
    fn exhausted_retries_are_a_fault() {
        let err = AppError::RetriesExhausted {
            attempts: 3,
            last: Box::new(AppError::Conflict("busy".to_string())),
        };
        assert_eq!(err.kind(), ErrorKind::Fault);
        assert!(!err.is_retryable());
    }
}
