pub mod peer_entry;
pub mod peer_registry;
