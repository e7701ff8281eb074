//! # Engine Error Types
//!
//! What service callers see: the domain taxonomy plus database failures.
//!
//! Domain preconditions checked inside database transactions travel up as
//! `DbError::Domain`; the conversion below unwraps them so callers always
//! match on `EngineError::Core` for business failures, regardless of which
//! layer detected them.

use thiserror::Error;

use bodega_core::{CoreError, ValidationError};
use bodega_db::DbError;

/// Errors returned by the engine services.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule or precondition failed. No partial mutation happened.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The backing store failed.
    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => EngineError::Core(core),
            other => EngineError::Db(other),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bodega_core::VariantKey;

    #[test]
    fn test_domain_db_errors_flatten_to_core() {
        let core = CoreError::InsufficientStock {
            variant: VariantKey {
                product_id: 1,
                size_id: 1,
                color_id: 1,
                branch_id: 1,
            },
            available: 0,
            requested: 5,
        };
        let engine: EngineError = DbError::Domain(core).into();
        assert!(matches!(
            engine,
            EngineError::Core(CoreError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn test_other_db_errors_stay_db() {
        let engine: EngineError = DbError::PoolExhausted.into();
        assert!(matches!(engine, EngineError::Db(DbError::PoolExhausted)));
    }
}
