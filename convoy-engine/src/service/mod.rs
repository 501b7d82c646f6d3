//! Service Module
//!
//! Definition-management layer of the engine: the pipeline registry and
//! the template catalog. Services validate caller intent and orchestrate
//! the repositories; run execution lives in `exec`.

pub mod registry;
pub mod template;

pub use registry::PipelineRegistry;
pub use template::TemplateCatalog;
