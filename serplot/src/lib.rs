pub mod config;
pub mod data;
pub mod session;
pub mod text;
pub mod worker;

pub use config::{ConfigError, PlotterConfig};
pub use data::SeriesBuffer;
pub use session::Session;
pub use text::StreamParser;
