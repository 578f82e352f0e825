pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod search;
pub mod storage;
pub mod sweeper;
pub mod wal;
