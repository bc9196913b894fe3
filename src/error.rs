//! Error type shared by every flux-serializer operation.
//!
//! A serialize call either returns a complete normalized output or fails with
//! one of these variants. Entities that vanished between discovery and fetch
//! are not errors; they are simply left out of the output.

use may_postgres::Error as PostgresError;
use std::fmt;
use std::time::Duration;

/// Flux serializer error type
#[derive(Debug)]
pub enum FluxError {
    /// An entity type has no resolvable primary key, schema or attribute
    Configuration(String),
    /// The relationship traversal went deeper than the configured bound
    RecursionLimitExceeded {
        entity: String,
        level: usize,
        limit: usize,
    },
    /// Store collaborator failure, propagated as-is
    Store(String),
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// The whole discover + assemble pipeline ran past its deadline
    DeadlineExceeded { budget: Duration },
    /// Serializer registration problem (duplicate type, duplicate API name, poisoned lock)
    Registry(String),
}

impl fmt::Display for FluxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            FluxError::RecursionLimitExceeded {
                entity,
                level,
                limit,
            } => write!(
                f,
                "Relationship traversal reached level {level} at '{entity}' (limit {limit}); \
                 check the relationship graph for cycles or misdeclared relations"
            ),
            FluxError::Store(msg) => write!(f, "Store error: {msg}"),
            FluxError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            FluxError::DeadlineExceeded { budget } => {
                write!(f, "Serialization exceeded its deadline of {budget:?}")
            }
            FluxError::Registry(msg) => write!(f, "Serializer registry error: {msg}"),
        }
    }
}

impl std::error::Error for FluxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FluxError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for FluxError {
    fn from(err: PostgresError) -> Self {
        FluxError::Postgres(err)
    }
}

impl FluxError {
    /// Whether the error is a fatal defect in the entity configuration or graph,
    /// as opposed to a runtime failure of the store.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            FluxError::Configuration(_) | FluxError::RecursionLimitExceeded { .. } | FluxError::Registry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flux_error_display() {
        let err = FluxError::Configuration("no primary key".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("no primary key"));
    }

    #[test]
    fn test_recursion_limit_display() {
        let err = FluxError::RecursionLimitExceeded {
            entity: "nodes".to_string(),
            level: 21,
            limit: 20,
        };
        let display = err.to_string();
        assert!(display.contains("level 21"));
        assert!(display.contains("'nodes'"));
        assert!(display.contains("limit 20"));
    }

    #[test]
    fn test_error_classification() {
        assert!(FluxError::Registry("dup".to_string()).is_configuration_defect());
        assert!(!FluxError::Store("down".to_string()).is_configuration_defect());
        assert!(!FluxError::DeadlineExceeded {
            budget: Duration::from_millis(5)
        }
        .is_configuration_defect());
    }
}
