use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use tree_sitter::Tree;

use super::association::AssociationStrategy;
use super::associator::DocAssociator;
use super::comments::{CommentBlock, CommentParser};
use super::construct::Construct;
use super::extractor::AstExtractor;
use super::merge::MergeConflict;
use super::languages::{LanguageInfo, LanguageRegistry};
use crate::config::Config;
use crate::error::{DocwrightError, Result};

/// Everything extracted from one source file
///
/// Plain data only: the syntax tree and source buffer are dropped before this
/// is returned.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// File path as discovered
    pub path: PathBuf,

    /// Configured language name
    pub language: String,

    /// SHA-256 of the file content
    pub content_hash: String,

    pub constructs: Vec<Construct>,

    pub comment_blocks: Vec<CommentBlock>,

    /// Conflicts met while merging repeated declarations within the file
    pub conflicts: Vec<MergeConflict>,
}

/// Reads, parses and extracts source files of every registered language
pub struct CodeParser {
    registry: LanguageRegistry,
    max_file_size: usize,
    exclude_patterns: Vec<String>,
    extractor: AstExtractor,
    comment_parser: CommentParser,
    associator: DocAssociator,
}

impl CodeParser {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: LanguageRegistry::from_config(&config.languages),
            max_file_size: config.project.max_file_size,
            exclude_patterns: config.project.exclude_patterns.clone(),
            extractor: AstExtractor::new(),
            comment_parser: CommentParser::new(),
            associator: DocAssociator::new(),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.resolve(path).is_some()
    }

    /// Source files under `root` with a registered extension
    ///
    /// Respects `.gitignore` and the configured exclude patterns. A file path
    /// is returned as-is when its extension is registered.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if root.is_file() {
            return Ok(if self.is_supported(root) {
                vec![root.to_path_buf()]
            } else {
                Vec::new()
            });
        }

        let mut overrides = OverrideBuilder::new(root);
        for pattern in &self.exclude_patterns {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| DocwrightError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e)))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| DocwrightError::Config(e.to_string()))?;

        // Use ignore crate to respect .gitignore and custom patterns
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .overrides(overrides)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| DocwrightError::FileSystem(e.to_string()))?;
            let path = entry.path();
            if path.is_file() && self.is_supported(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        debug!("Discovered {} source files under {}", files.len(), root.display());
        Ok(files)
    }

    /// Extract constructs and comment blocks from one file
    ///
    /// Constructs the syntax tree leaves undocumented take the closest comment
    /// block a few lines above them.
    pub fn parse_file<P: AsRef<Path>>(&self, file_path: P) -> Result<ParsedFile> {
        let path = file_path.as_ref();
        let language = self.language_for(path)?;
        let source = self.read_source(path)?;
        let tree = parse_tree(language, &source, path)?;

        let filename = path.display().to_string();
        let extraction = self.extractor.extract_constructs(&tree, &source, &filename);
        let mut constructs = extraction.constructs;
        let comment_blocks = self.comment_parser.extract(&source, &language.comment_style);

        for construct in constructs.iter_mut().filter(|c| !c.has_docstring()) {
            let fallback = AssociationStrategy::LineProximity {
                blocks: &comment_blocks,
                line: construct.start_line,
            };
            if let Some(docstring) = fallback.docstring() {
                // A later cross-file merge rebuilds docs from this list
                if construct.is_merged {
                    construct.merged_docstrings.push(docstring.clone());
                }
                construct.docstring = Some(docstring);
            }
        }

        Ok(ParsedFile {
            path: path.to_path_buf(),
            language: language.name.clone(),
            content_hash: calculate_hash(&source),
            constructs,
            comment_blocks,
            conflicts: extraction.conflicts,
        })
    }

    /// Comment blocks of one file, each linked to the construct following it
    pub fn parse_comments<P: AsRef<Path>>(&self, file_path: P) -> Result<Vec<CommentBlock>> {
        let path = file_path.as_ref();
        let language = self.language_for(path)?;
        let source = self.read_source(path)?;
        let tree = parse_tree(language, &source, path)?;

        let mut blocks = self.comment_parser.extract(&source, &language.comment_style);
        self.associator.associate(&mut blocks, &tree, &source);
        Ok(blocks)
    }

    fn language_for(&self, path: &Path) -> Result<&LanguageInfo> {
        self.registry.resolve(path).ok_or_else(|| {
            DocwrightError::Language(format!("No language registered for file: {}", path.display()))
        })
    }

    fn read_source(&self, path: &Path) -> Result<String> {
        let size = std::fs::metadata(path)?.len();
        if size > self.max_file_size as u64 {
            return Err(DocwrightError::Parser(format!(
                "File {} exceeds maximum size limit ({} > {} bytes)",
                path.display(),
                size,
                self.max_file_size
            )));
        }

        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn parse_tree(language: &LanguageInfo, source: &str, path: &Path) -> Result<Tree> {
    let mut parser = language.new_parser()?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| DocwrightError::Parser(format!("Failed to parse {}", path.display())))?;

    if tree.root_node().has_error() {
        warn!("Syntax errors in {}, extraction may be incomplete", path.display());
    }
    Ok(tree)
}

/// Calculate SHA256 hash of content
pub fn calculate_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
