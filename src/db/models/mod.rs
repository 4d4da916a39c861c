//! Database models split into separate files.

pub mod event;
pub mod swap_request;
pub mod user;

pub use self::event::*;
pub use self::swap_request::*;
pub use self::user::*;
