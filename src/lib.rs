pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{catalog::StaticCatalog, http::HttpTransport, storage::LocalStorage};
pub use app::job::{ConversionJob, JobOutcome};
pub use config::job::JobConfig;
#[cfg(feature = "cli")]
pub use config::cli::CliArgs;
pub use crate::core::{
    dispatcher::{BatchReport, BatchRequest, CancelFlag, DispatchOptions, Dispatcher},
    mapper::ColumnMapper,
    pipeline::MappingChain,
    template::{TemplateEngine, ValueEscape},
};
pub use utils::error::{ConvertError, Result};
