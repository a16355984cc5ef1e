use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unparseable timestamp, clock time or day name.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A run cannot start, e.g. there is no active academic term.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A stored row does not have the shape the engine expects.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    /// Record-level failures are skipped and counted; everything else aborts the run.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::InvalidRecord(_))
    }
}
