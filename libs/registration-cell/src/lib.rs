pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod router;
pub mod services;

pub use error::RegistrationError;
pub use models::*;
pub use services::RegistrationBookingService;
