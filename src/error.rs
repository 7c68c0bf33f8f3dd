#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Parse(err)
    }
}

/// Folds unique-key and foreign-key failures into `ConstraintViolation` so
/// callers can tell them apart from connection-level trouble.
pub(crate) fn constraint_err(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.is_foreign_key_violation() =>
        {
            Error::ConstraintViolation(db.message().to_string())
        }
        _ => Error::Database(err),
    }
}
