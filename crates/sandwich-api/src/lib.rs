pub mod auth;
pub mod contexts;
pub mod conversations;
pub mod error;
pub mod kudos;
pub mod messaging;
pub mod middleware;
pub mod routes;
