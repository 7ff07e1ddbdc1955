pub mod cli;
pub mod config;
mod db;
pub mod docdb;
pub mod document;
pub mod export;
pub mod feature;
pub mod hashing;
pub mod local;
mod metrics;
mod persist;
pub mod registry;
pub mod utils;

pub use config::Opts;
pub use docdb::{DocDB, DocDBBuilder};
