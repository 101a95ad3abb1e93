pub mod api;
pub mod catalog;
pub mod db;
pub mod error;
pub mod guard;
pub mod idempotency;
pub mod intake;
pub mod models;
pub mod pricing;
pub mod repository;
pub mod schema;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod writer;
