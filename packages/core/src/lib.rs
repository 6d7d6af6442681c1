// Library root, exposing internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod alert;
pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod repository;
pub mod supervisor;

pub mod cli;
pub mod config;
pub mod logging;
