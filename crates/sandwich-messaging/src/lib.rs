pub mod conversations;
pub mod error;
pub mod kudos;
pub mod notify;
pub mod service;
pub mod threading;

pub use error::MessagingError;
pub use service::MessagingService;
