use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of code symbol a [`Construct`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Variable,
    Namespace,
    Constructor,
    Destructor,
}

impl ConstructKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstructKind::Function => "function",
            ConstructKind::Method => "method",
            ConstructKind::Class => "class",
            ConstructKind::Struct => "struct",
            ConstructKind::Enum => "enum",
            ConstructKind::Variable => "variable",
            ConstructKind::Namespace => "namespace",
            ConstructKind::Constructor => "constructor",
            ConstructKind::Destructor => "destructor",
        }
    }

    /// Kinds that carry a callable signature
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            ConstructKind::Function
                | ConstructKind::Method
                | ConstructKind::Constructor
                | ConstructKind::Destructor
        )
    }
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One formal parameter of a callable construct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub param_type: String,
    pub name: String,
    pub default_value: Option<String>,
}

/// A named code symbol extracted from a syntax tree
///
/// Holds plain values only; nothing here borrows from the tree or the source
/// buffer it was extracted from. `full_name` is the identity key used when
/// merging declaration and definition sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construct {
    pub kind: ConstructKind,
    pub name: String,
    pub full_name: String,
    pub namespace_path: String,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    pub is_static: bool,
    pub is_const: bool,
    pub is_virtual: bool,
    pub base_classes: Vec<String>,
    pub access_modifier: String,
    pub docstring: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub source_file: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_docstrings: Vec<String>,
    #[serde(default)]
    pub is_merged: bool,
}

impl Construct {
    pub fn new(kind: ConstructKind, name: impl Into<String>, source_file: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind,
            full_name: name.clone(),
            name,
            namespace_path: String::new(),
            return_type: None,
            parameters: Vec::new(),
            is_static: false,
            is_const: false,
            is_virtual: false,
            base_classes: Vec::new(),
            access_modifier: String::new(),
            docstring: None,
            start_line: 0,
            end_line: 0,
            source_file: source_file.into(),
            source_locations: Vec::new(),
            merged_docstrings: Vec::new(),
            is_merged: false,
        }
    }

    /// `file:line` of the site this construct was extracted from
    pub fn location(&self) -> String {
        format!("{}:{}", self.source_file, self.start_line)
    }

    pub fn has_docstring(&self) -> bool {
        self.docstring.as_deref().is_some_and(|doc| !doc.trim().is_empty())
    }

    pub fn is_unnamed(&self) -> bool {
        self.full_name.is_empty() && self.name.is_empty()
    }
}
