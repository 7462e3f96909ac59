mod engine;
mod parser;
mod cache;
mod markdown;

// Extraction pipeline
mod syntax;
mod naming;
mod association;
mod associator;
mod comments;
mod construct;
mod extractor;
mod merge;

// Grammar registry
mod languages;

pub use parser::CodeParser;
pub use cache::DocumentationCache;
pub use markdown::{construct_filename, MarkdownEmitter};
pub use construct::Construct;
pub use merge::merge_duplicate_constructs;
pub use languages::Grammar;

pub use engine::Engine;
