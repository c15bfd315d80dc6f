pub mod client_config;
pub mod overlay_client;
pub mod scheduler;
