//! Service layer

pub mod user;

pub use user::{RegisterRequest, UpdateProfileRequest, UserService};

use crate::repository::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("the email is already in use")]
    EmailInUse,

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Repo(#[from] RepoError),
}
