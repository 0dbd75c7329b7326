pub mod delta;
pub mod engine;
pub mod models;
pub mod normalizer;
pub mod store;

pub use engine::{IngestSummary, IngestionEngine};
pub use store::CatalogStore;
