// Database module
// On-disk persistence for the knowledge base (LanceDB)

pub mod lancedb;

pub use self::lancedb::{CollectionManifest, VectorIndex};
