pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod org;
pub mod resources;
pub mod state;
pub mod storage;

#[cfg(test)]
pub mod testing;
