pub mod config;
pub mod db;
pub mod observability;
pub mod provider;
pub mod settings_summary;
pub mod types;
