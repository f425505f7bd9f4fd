pub mod auth;
pub mod reconciler;
