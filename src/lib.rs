pub mod config;
pub mod error;
pub mod plugin;
pub mod storage;
pub mod transform;
pub mod utils;
