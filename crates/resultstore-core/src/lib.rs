pub mod codec;
pub mod config;
pub mod fetcher;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod query;
pub mod runtime;
pub mod sqlite;
pub mod store;
