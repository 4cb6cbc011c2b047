pub mod auth;
pub mod products;
pub mod routes;
pub mod utils;
