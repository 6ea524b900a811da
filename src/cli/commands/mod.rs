pub mod config;
pub mod docs;
pub mod synthesize;
