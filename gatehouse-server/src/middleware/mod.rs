//! Request middleware

pub mod sign;

pub use sign::{sign_middleware, SignError, Signer};
