//! Repository traits composing the metadata store.

pub mod caches;
pub mod chunks;
pub mod events;
pub mod packages;

pub use caches::CacheRepo;
pub use chunks::ChunkRepo;
pub use events::EventRepo;
pub use packages::PackageRepo;
