//! Dependency graph: extraction, resolution, cache, and incremental build.

pub mod builder;
pub mod extractor;
pub mod models;
pub mod resolver;

pub use builder::GraphService;
pub use extractor::{ImportExtractor, RegexImportExtractor, SupportedLanguage};
pub use models::{DependencyGraph, GraphEdge, GraphMetadata, GraphNode, GraphView};
pub use resolver::resolve_import;
