pub mod activity;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod session;
pub mod sheet;
pub mod storage;
pub mod types;
