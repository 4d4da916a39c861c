pub mod event;
pub mod swap_request;
pub mod user;

pub use event::EventRepository;
pub use swap_request::SwapRequestRepository;
pub use user::UserRepository;
