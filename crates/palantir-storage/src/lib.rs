//! Durable session-store implementation with encryption at rest.
//! Session facts (email, chain id, login flags) are AES-GCM sealed per key,
//! with key material sourced from the OS keyring (or test doubles).

pub mod encrypted_store;
pub mod key_source;
