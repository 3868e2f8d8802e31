use thiserror::Error;

use crate::validator::ValidationErrors;

/// Errors surfaced by the store. Every `rusqlite::Error` converted with `?`
/// goes through [`crate::gateway::map_constraint`], so constraint violations
/// raised by the database arrive as the named variants.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    RecordNotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("user doesn't exist")]
    ReferencedUserDoesNotExist,

    #[error("parent recipe doesn't exist")]
    ParentRecipeDoesNotExist,

    #[error("pantry item does not exist")]
    PantryItemDoesNotExist,

    #[error("recipe does not exist")]
    RecipeDoesNotExist,

    #[error("consumable does not exist")]
    ConsumableDoesNotExist,

    #[error("child recipe exists")]
    ChildRecipeExists,

    #[error("record is still referenced")]
    RecordInUse,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("validation failed: {0}")]
    ValidationFailed(ValidationErrors),

    #[error("operation exceeded its deadline")]
    DeadlineExceeded,

    #[error("sqlite: {0}")]
    Internal(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        crate::gateway::map_constraint(err)
    }
}

impl StoreError {
    /// The field messages when this is a validation failure.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
