//! Error types for Latch

use thiserror::Error;

/// Result type alias using Latch's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure category an [`Error`] belongs to.
///
/// Hosts that only care about the coarse outcome (for permission auditing or
/// metrics) match on this instead of the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Forbidden,
    LimitExceeded,
    NameConflict,
    InvalidRequest,
    InvalidConfiguration,
    StorageUnavailable,
}

/// Latch error types.
///
/// The `Display` text of each variant is the message shown to the user who
/// triggered the operation.
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors (E001-E099)
    #[error("There is no lock there.")]
    NotFound,

    #[error("There is already a lock there.")]
    AlreadyLocked,

    #[error("The adjacent {0} is already locked.")]
    PartnerLocked(String),

    // Access errors (E100-E199)
    #[error("You are not the owner of this lock.")]
    NotOwner,

    #[error("You cannot access this lock.")]
    AccessDenied,

    #[error("Incorrect password.")]
    InvalidPassword,

    // Limit errors (E200-E299)
    #[error("You have reached the limit for {bucket} locks ({limit}).")]
    LimitExceeded { bucket: String, limit: u32 },

    #[error("You cannot change this lock due to lock limits.")]
    ChangeLimitExceeded { bucket: String, limit: u32 },

    // Naming errors (E300-E399)
    #[error("A lock named '{0}' already exists for that owner.")]
    NameConflict(String),

    // Request errors (E400-E499)
    #[error("You cannot lock a {0}.")]
    NotLockable(String),

    #[error("A password is required for a {0} lock.")]
    PasswordRequired(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    // Storage errors (E700-E799)
    #[error("Lock storage is unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Stored lock data is corrupt: {0}")]
    Parse(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "E001",
            Self::AlreadyLocked => "E002",
            Self::PartnerLocked(_) => "E003",
            Self::NotOwner => "E100",
            Self::AccessDenied => "E101",
            Self::InvalidPassword => "E102",
            Self::LimitExceeded { .. } => "E200",
            Self::ChangeLimitExceeded { .. } => "E201",
            Self::NameConflict(_) => "E300",
            Self::NotLockable(_) => "E400",
            Self::PasswordRequired(_) => "E401",
            Self::InvalidInput(_) => "E402",
            Self::InvalidConfiguration(_) => "E600",
            Self::StorageUnavailable(_) => "E700",
            Self::Parse(_) => "E701",
        }
    }

    /// Collapse the variant into its failure category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound => ErrorCategory::NotFound,
            Self::NotOwner | Self::AccessDenied | Self::InvalidPassword => ErrorCategory::Forbidden,
            Self::LimitExceeded { .. } | Self::ChangeLimitExceeded { .. } => {
                ErrorCategory::LimitExceeded
            }
            Self::NameConflict(_) => ErrorCategory::NameConflict,
            Self::AlreadyLocked
            | Self::PartnerLocked(_)
            | Self::NotLockable(_)
            | Self::PasswordRequired(_)
            | Self::InvalidInput(_) => ErrorCategory::InvalidRequest,
            Self::InvalidConfiguration(_) => ErrorCategory::InvalidConfiguration,
            Self::StorageUnavailable(_) | Self::Parse(_) => ErrorCategory::StorageUnavailable,
        }
    }

    /// Whether the failure came from the storage layer rather than the request
    pub fn is_storage_failure(&self) -> bool {
        self.category() == ErrorCategory::StorageUnavailable
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NameConflict(_) => Some("Choose a different lock name".to_string()),
            Self::InvalidPassword => Some("/unlock <password>".to_string()),
            Self::PasswordRequired(_) => Some("Supply a password when creating the lock".to_string()),
            Self::StorageUnavailable(_) => Some("Check the storage.database_path setting".to_string()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
