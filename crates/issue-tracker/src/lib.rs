pub mod db;
pub mod error;
pub mod id;
pub mod issues;
pub mod payload;
pub mod server;
pub mod store;
pub mod types;
