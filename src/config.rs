use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{DocwrightError, Result};

/// File names probed, in order, when no configuration path is given
pub const DEFAULT_CONFIG_FILES: [&str; 3] = ["docwright.toml", "Docwright.toml", ".docwright.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project layout: where sources live and where pages go
    #[serde(default)]
    pub project: ProjectConfig,

    /// Language name -> grammar and comment style
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, LanguageConfig>,

    /// Page emission settings
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Source directories to analyze
    pub source_dirs: Vec<PathBuf>,

    /// Directory receiving one markdown page per construct, plus the cache
    pub extract_dir: PathBuf,

    /// Directory that `generate` copies finished pages into
    pub output_dir: PathBuf,

    /// Glob patterns excluded from discovery
    pub exclude_patterns: Vec<String>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Built-in grammar identifier (`cpp`, `c`)
    pub grammar: String,

    /// File extensions handled by this language, with or without the leading dot
    pub extensions: Vec<String>,

    /// Documentation comment style: `/** */`, `/// ` or `//! `
    pub docstring_style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Emit pages for constructs that carry no documentation
    pub include_undocumented: bool,

    /// Drop constructs whose name could not be recovered
    pub skip_unnamed: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dirs: vec![PathBuf::from("src"), PathBuf::from("include")],
            extract_dir: PathBuf::from(".docwright"),
            output_dir: PathBuf::from("docs/extracted"),
            exclude_patterns: vec!["**/test/**".to_string(), "**/*_test.*".to_string()],
            max_file_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            include_undocumented: true,
            skip_unnamed: false,
        }
    }
}

fn default_languages() -> BTreeMap<String, LanguageConfig> {
    let mut languages = BTreeMap::new();
    languages.insert(
        "cpp".to_string(),
        LanguageConfig {
            grammar: "cpp".to_string(),
            extensions: [".cpp", ".hpp", ".cc", ".h", ".cxx", ".hh"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            docstring_style: "/** */".to_string(),
        },
    );
    languages.insert(
        "c".to_string(),
        LanguageConfig {
            grammar: "c".to_string(),
            extensions: vec![".c".to_string()],
            docstring_style: "/** */".to_string(),
        },
    );
    languages
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            languages: default_languages(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DocwrightError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DocwrightError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    ///
    /// An explicitly requested file must exist; otherwise the default file
    /// names are probed in the working directory before falling back to the
    /// built-in defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                let p = p.as_ref();
                if !p.is_file() {
                    return Err(DocwrightError::Config(format!(
                        "configuration file not found: {}",
                        p.display()
                    )));
                }
                Self::load(p)
            }
            None => {
                for candidate in &DEFAULT_CONFIG_FILES {
                    if Path::new(candidate).is_file() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registers_cpp_and_c() {
        let config = Config::default();
        assert_eq!(config.languages["cpp"].grammar, "cpp");
        assert!(config.languages["cpp"].extensions.contains(&".h".to_string()));
        assert_eq!(config.languages["c"].docstring_style, "/** */");
        assert_eq!(config.project.extract_dir, PathBuf::from(".docwright"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[project]
source_dirs = ["lib"]

[output]
skip_unnamed = true
"#,
        )
        .unwrap();

        assert_eq!(config.project.source_dirs, vec![PathBuf::from("lib")]);
        assert_eq!(config.project.max_file_size, 1024 * 1024);
        assert!(config.output.skip_unnamed);
        assert!(config.output.include_undocumented);
        assert!(config.languages.contains_key("cpp"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docwright.toml");

        let mut config = Config::default();
        config.project.extract_dir = PathBuf::from("snippets");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.project.extract_dir, PathBuf::from("snippets"));
        assert_eq!(loaded.languages.len(), 2);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load_or_default(Some("/definitely/not/here.toml"));
        assert!(matches!(result, Err(DocwrightError::Config(_))));
    }
}
