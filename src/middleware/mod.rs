pub mod auth;

pub use auth::{AuthLayer, AuthenticatedMember};
