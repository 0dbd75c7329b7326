pub mod blocked;
pub mod detect;
pub mod error;
pub mod extract;
pub mod locations;
pub mod orchestrator;
pub mod summary;

pub use detect::PlatformDetector;
pub use error::ScrapeError;
pub use locations::load_locations;
pub use orchestrator::{Orchestrator, OrchestratorConfig, TickOutcome};
