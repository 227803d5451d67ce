//! Error module tests

use crate::error::{Error, ErrorCategory};

#[test]
fn test_error_codes_are_unique() {
    let errors = [
        Error::NotFound,
        Error::AlreadyLocked,
        Error::PartnerLocked("chest".to_string()),
        Error::NotOwner,
        Error::AccessDenied,
        Error::InvalidPassword,
        Error::LimitExceeded {
            bucket: "owner_only".to_string(),
            limit: 2,
        },
        Error::ChangeLimitExceeded {
            bucket: "owner_only".to_string(),
            limit: 2,
        },
        Error::NameConflict("vault".to_string()),
        Error::NotLockable("dirt".to_string()),
        Error::PasswordRequired("password_once".to_string()),
        Error::InvalidInput("x".to_string()),
        Error::InvalidConfiguration("x".to_string()),
        Error::StorageUnavailable("x".to_string()),
        Error::Parse("x".to_string()),
    ];

    let mut codes: Vec<&str> = errors.iter().map(Error::code).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
}

#[test]
fn test_categories() {
    assert_eq!(Error::NotFound.category(), ErrorCategory::NotFound);
    assert_eq!(Error::NotOwner.category(), ErrorCategory::Forbidden);
    assert_eq!(Error::InvalidPassword.category(), ErrorCategory::Forbidden);
    assert_eq!(
        Error::ChangeLimitExceeded {
            bucket: "total".to_string(),
            limit: 1
        }
        .category(),
        ErrorCategory::LimitExceeded
    );
    assert_eq!(
        Error::NameConflict("a".to_string()).category(),
        ErrorCategory::NameConflict
    );
    assert_eq!(
        Error::InvalidConfiguration("a".to_string()).category(),
        ErrorCategory::InvalidConfiguration
    );
}

#[test]
fn test_storage_failure_is_not_not_found() {
    let err: Error = sqlx::Error::PoolTimedOut.into();
    assert!(err.is_storage_failure());
    assert_ne!(err.category(), ErrorCategory::NotFound);
    assert!(!Error::NotFound.is_storage_failure());
}

#[test]
fn test_user_facing_messages() {
    assert_eq!(Error::NotFound.to_string(), "There is no lock there.");
    assert_eq!(
        Error::NotOwner.to_string(),
        "You are not the owner of this lock."
    );
    assert_eq!(
        Error::LimitExceeded {
            bucket: "owner_only".to_string(),
            limit: 2
        }
        .to_string(),
        "You have reached the limit for owner_only locks (2)."
    );
}

#[test]
fn test_suggestions() {
    assert!(Error::NameConflict("a".to_string()).suggestion().is_some());
    assert!(Error::NotFound.suggestion().is_none());
}
