//! Built-in retriever implementations.
//!
//! - [`LocalCopyRetriever`] (`local`) - stages files already on local or
//!   mounted storage, optionally writing a mosaic manifest
//! - [`CommandRetriever`] (`command`) - runs an external tool per
//!   constituent (GDAL, ASP, ...) from a command template
//!
//! Data-source specific retrievers (footprint catalogs, WMS, DEM archives)
//! are registered by the embedding application through
//! [`RetrieverRegistry::register`](crate::retriever::RetrieverRegistry::register).

mod command;
mod local;

pub use command::CommandRetriever;
pub use local::LocalCopyRetriever;
