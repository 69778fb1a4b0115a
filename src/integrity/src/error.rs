use common::schema::GraphError;

/// Why an operation refused to run. Nothing has been read or written when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionFailure {
    #[error("tenant {0} is active; suspend or deactivate it before deletion")]
    TenantActive(String),
    #[error("the quarantine tenant cannot be modified through this operation")]
    QuarantineTenantProtected,
    #[error("no quarantine tenant exists")]
    QuarantineTenantMissing,
    #[error("purge is disabled (purge.allow = false)")]
    PurgeNotAllowed,
    #[error("purge in production is disabled (purge.allow_in_production = false)")]
    PurgeNotAllowedInProduction,
    #[error("confirmation phrase does not match")]
    ConfirmationPhraseMismatch,
    #[error("live run requires the header x-confirm-repair: apply")]
    MissingConfirmation,
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionFailure),
    #[error("Transaction rolled back at {table}: {source}")]
    Transaction {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Schema error: {0}")]
    Schema(#[from] GraphError),
}

impl From<common::store::TransactionFailure> for IntegrityError {
    fn from(failure: common::store::TransactionFailure) -> Self {
        IntegrityError::Transaction {
            table: failure.label,
            source: failure.source,
        }
    }
}

impl IntegrityError {
    pub fn validation(message: impl Into<String>) -> Self {
        IntegrityError::Validation(message.into())
    }

    /// Short machine-readable category used in error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            IntegrityError::Validation(_) => "validation",
            IntegrityError::NotFound(_) => "not_found",
            IntegrityError::Precondition(PreconditionFailure::MissingConfirmation) => {
                "confirmation_required"
            }
            IntegrityError::Precondition(_) => "precondition_failed",
            IntegrityError::Transaction { .. } => "transaction_failed",
            IntegrityError::Store(_) | IntegrityError::Schema(_) => "internal",
        }
    }
}

pub type Result<T, E = IntegrityError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(IntegrityError::validation("x").category(), "validation");
        assert_eq!(
            IntegrityError::from(PreconditionFailure::MissingConfirmation).category(),
            "confirmation_required"
        );
        assert_eq!(
            IntegrityError::from(PreconditionFailure::TenantActive("t".into())).category(),
            "precondition_failed"
        );
        assert_eq!(
            IntegrityError::Store(sqlx::Error::RowNotFound).category(),
            "internal"
        );
    }
}
