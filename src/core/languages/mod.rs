//! Grammar registry for the languages docwright can read
//!
//! Each configured language names a built-in grammar, the file extensions it
//! claims and the comment style its documentation is written in. Files are
//! matched to a language by extension.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tree_sitter::{Language, Parser};
use tracing::{debug, warn};

use super::comments::CommentStyle;
use crate::config::LanguageConfig;
use crate::error::{DocwrightError, Result};

/// Grammars linked into the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    Cpp,
    C,
}

impl Grammar {
    pub const ALL: [Grammar; 2] = [Grammar::Cpp, Grammar::C];

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Some(Grammar::Cpp),
            "c" => Some(Grammar::C),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Grammar::Cpp => "cpp",
            Grammar::C => "c",
        }
    }

    /// Crate providing the grammar
    pub fn source(&self) -> &'static str {
        match self {
            Grammar::Cpp => "tree-sitter-cpp",
            Grammar::C => "tree-sitter-c",
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Grammar::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Grammar::C => tree_sitter_c::LANGUAGE.into(),
        }
    }
}

/// A configured language, resolved against the built-in grammars
#[derive(Debug, Clone)]
pub struct LanguageInfo {
    pub name: String,
    pub grammar: Grammar,
    /// Normalized: lowercase, no leading dot
    pub extensions: Vec<String>,
    pub comment_style: CommentStyle,
}

impl LanguageInfo {
    /// A parser bound to this language's grammar
    pub fn new_parser(&self) -> Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar.language()).map_err(|e| {
            DocwrightError::Language(format!("Failed to load {} grammar: {}", self.grammar.id(), e))
        })?;
        Ok(parser)
    }
}

/// Maps file extensions to languages
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: Vec<LanguageInfo>,
    by_extension: HashMap<String, usize>,
}

impl LanguageRegistry {
    /// Build the registry from the `[languages]` configuration table
    ///
    /// Languages naming an unknown grammar are skipped. When two languages
    /// claim the same extension, the first in name order keeps it.
    pub fn from_config(languages: &BTreeMap<String, LanguageConfig>) -> Self {
        let mut registry = Self::default();

        for (name, config) in languages {
            let Some(grammar) = Grammar::from_id(&config.grammar) else {
                warn!("Language '{}' uses unknown grammar '{}', skipping", name, config.grammar);
                continue;
            };

            let index = registry.languages.len();
            let mut extensions = Vec::new();
            for extension in config.extensions.iter().map(|ext| normalize_extension(ext)) {
                if extension.is_empty() {
                    continue;
                }
                match registry.by_extension.get(&extension) {
                    Some(&owner) => warn!(
                        "Extension '.{}' already handled by '{}', ignoring it for '{}'",
                        extension, registry.languages[owner].name, name
                    ),
                    None => {
                        registry.by_extension.insert(extension.clone(), index);
                        extensions.push(extension);
                    }
                }
            }

            debug!("Registered language '{}' ({}) for {:?}", name, grammar.id(), extensions);
            registry.languages.push(LanguageInfo {
                name: name.clone(),
                grammar,
                extensions,
                comment_style: CommentStyle::from_config(&config.docstring_style),
            });
        }

        registry
    }

    /// Language for a file, chosen by its extension
    pub fn resolve(&self, path: &Path) -> Option<&LanguageInfo> {
        let extension = path.extension()?.to_str()?;
        self.resolve_extension(extension)
    }

    pub fn resolve_extension(&self, extension: &str) -> Option<&LanguageInfo> {
        self.by_extension
            .get(&normalize_extension(extension))
            .map(|&index| &self.languages[index])
    }

    pub fn languages(&self) -> &[LanguageInfo] {
        &self.languages
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_languages_resolve() {
        let registry = LanguageRegistry::from_config(&Config::default().languages);

        let header = registry.resolve(Path::new("include/widget.h")).unwrap();
        assert_eq!(header.grammar, Grammar::Cpp);
        assert_eq!(header.comment_style, CommentStyle::Block);

        let c = registry.resolve(Path::new("src/main.c")).unwrap();
        assert_eq!(c.grammar, Grammar::C);

        assert!(registry.resolve(Path::new("Makefile")).is_none());
        assert!(registry.resolve(Path::new("notes.txt")).is_none());
    }

    #[test]
    fn test_extensions_with_or_without_dot() {
        let mut languages = BTreeMap::new();
        languages.insert(
            "cpp".to_string(),
            LanguageConfig {
                grammar: "cpp".to_string(),
                extensions: vec!["cc".to_string(), ".HPP".to_string()],
                docstring_style: "/// ".to_string(),
            },
        );
        let registry = LanguageRegistry::from_config(&languages);

        assert!(registry.resolve_extension(".cc").is_some());
        assert!(registry.resolve_extension("hpp").is_some());
        assert!(registry.resolve(Path::new("a.hpp")).is_some());
        assert_eq!(
            registry.resolve_extension("cc").unwrap().comment_style,
            CommentStyle::LinePrefixed("///")
        );
    }

    #[test]
    fn test_unknown_grammar_and_duplicate_extension() {
        let mut languages = BTreeMap::new();
        languages.insert(
            "a_cpp".to_string(),
            LanguageConfig {
                grammar: "cpp".to_string(),
                extensions: vec![".h".to_string()],
                docstring_style: "/** */".to_string(),
            },
        );
        languages.insert(
            "b_c".to_string(),
            LanguageConfig {
                grammar: "c".to_string(),
                extensions: vec![".h".to_string(), ".c".to_string()],
                docstring_style: "/** */".to_string(),
            },
        );
        languages.insert(
            "cobol".to_string(),
            LanguageConfig {
                grammar: "cobol".to_string(),
                extensions: vec![".cbl".to_string()],
                docstring_style: "/** */".to_string(),
            },
        );
        let registry = LanguageRegistry::from_config(&languages);

        assert_eq!(registry.languages().len(), 2);
        assert_eq!(registry.resolve_extension("h").unwrap().name, "a_cpp");
        assert_eq!(registry.resolve_extension("c").unwrap().name, "b_c");
        assert!(registry.resolve_extension("cbl").is_none());
    }

    #[test]
    fn test_parsers_load_for_every_grammar() {
        for grammar in Grammar::ALL {
            let info = LanguageInfo {
                name: grammar.id().to_string(),
                grammar,
                extensions: Vec::new(),
                comment_style: CommentStyle::Block,
            };
            let mut parser = info.new_parser().unwrap();
            let tree = parser.parse("int main(void) { return 0; }", None).unwrap();
            assert!(!tree.root_node().has_error());
        }
    }
}
