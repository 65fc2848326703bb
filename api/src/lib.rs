pub mod auth;
pub mod backend;
pub mod config;
pub mod dto;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod query;
pub mod routes;
pub mod session;
pub mod states;

pub use states::AppState;
