//! Durable backends for the notary chain.
//!
//! Backends implement [`notary_core::ChainStore`]; the append critical
//! section and genesis handling stay in [`notary_core::Chain`].

pub mod sled_store;

pub use sled_store::SledStore;
