pub mod ajax;
pub mod embedded;
pub mod ssr;

pub use ajax::AjaxExtractor;
pub use embedded::{EmbeddedConfig, EmbeddedExtractor};
pub use ssr::SsrExtractor;
