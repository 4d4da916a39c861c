pub mod auth;
pub mod events;
pub mod health;
pub mod notifications;
pub mod swaps;
