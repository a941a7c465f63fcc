pub mod clean;
pub mod config;
pub mod errors;
pub mod filter;
pub mod orchestrator;
pub mod post;
pub mod stream;
pub mod util;
