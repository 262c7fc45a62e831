//! Registry subsystem
//!
//! - [`RegistrySnapshot`]: immutable token → entry mapping
//! - [`seal`]: content digest of a snapshot
//! - [`RegistryPersistence`]: durable storage boundary (file or memory)
//! - [`RegistryStore`]: serialized commits, lock-free reads of the
//!   published snapshot

mod errors;
mod persistence;
mod seal;
mod snapshot;
mod store;

pub use errors::{PersistError, PersistResult, StoreError, StoreResult};
pub use persistence::{FilePersistence, MemoryPersistence, RegistryPersistence, FORMAT_VERSION};
pub use seal::{seal, InvalidSeal, Seal, EMPTY_SEAL_HEX};
pub use snapshot::{RegistryEntry, RegistrySnapshot, UpsertOutcome};
pub use store::{InhaleReport, PublishedRegistry, RegistryStore};
