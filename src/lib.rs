pub mod cli;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod tenancy;

#[cfg(test)]
pub mod testing;
