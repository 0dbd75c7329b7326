pub mod circuit;
pub mod config;
pub mod error;
pub mod fetch;
pub mod retry;
pub mod types;

pub use circuit::{CircuitError, CircuitOptions, CircuitRegistry, CircuitState};
pub use config::Config;
pub use error::{BudwatchError, ErrorKind};
pub use fetch::{fetch_with_retry, FetchOptions};
pub use retry::{with_retry, RetryOptions};
pub use types::{
    EventType, LocationResult, LocationStatus, MenuLocation, ScrapeBatch, ScrapedItem,
    SourcePlatform, QuantitySource, WeightUnit,
};
