//! addecat - ADDE server catalog
//!
//! Loads server/group descriptors from layered servers documents, merges and
//! filters them, and persists user edits to the writable layer.

pub mod coalesce;
pub mod config;
pub mod document;
pub mod legacy;
pub mod models;
pub mod paths;
pub mod registry;
pub mod resources;

pub use coalesce::{
    coalesce, migrate_legacy, same_identity, servers_with_type, CoalescedServer, LayerInput,
    Migration,
};
pub use config::{Config, ConfigError, MergePolicy};
pub use document::{DocumentError, ServersDocument};
pub use legacy::{read_legacy_servers, remove_legacy, LegacyError};
pub use models::{Credentials, RawServerEntry, ServerDescriptor};
pub use paths::Paths;
pub use registry::{
    LayerOutcome, LayerReport, LoadReport, RegistryError, ServerRegistry, ServerSelection,
};
pub use resources::{FileResources, MemoryResources, ResourceError, ResourceLayer, ResourceStore};
