//! Documentation comment scanning and structural parsing.
//!
//! Comments are found either as `/** ... */` blocks or as runs of
//! consecutive prefixed lines (`///`, `//!`). Every comment is normalised to
//! block form and parsed into a [`CommentBlock`].

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const BLOCK_OPEN: &str = "/**";
const BLOCK_CLOSE: &str = "*/";

/// Position of a comment or node inside a source buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based line
    pub line: usize,
    /// 0-based column, in bytes
    pub column: usize,
    pub byte_offset: usize,
}

impl SourceLocation {
    /// Derive a location by counting newlines from the start of `content`
    pub fn from_offset(content: &str, byte_offset: usize) -> Self {
        let prefix = &content.as_bytes()[..byte_offset.min(content.len())];
        let line = 1 + prefix.iter().filter(|&&b| b == b'\n').count();
        let column = match prefix.iter().rposition(|&b| b == b'\n') {
            Some(newline) => prefix.len() - newline - 1,
            None => prefix.len(),
        };

        Self {
            line,
            column,
            byte_offset,
        }
    }
}

/// Comment syntax a language documents its symbols with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentStyle {
    /// `/** ... */`
    Block,
    /// Consecutive lines starting with the prefix, e.g. `///`
    LinePrefixed(&'static str),
    /// Anything else; yields no comments
    Unsupported(String),
}

impl CommentStyle {
    pub fn from_config(style: &str) -> Self {
        match style.trim() {
            "/** */" | "/**" => CommentStyle::Block,
            "///" => CommentStyle::LinePrefixed("///"),
            "//!" => CommentStyle::LinePrefixed("//!"),
            other => CommentStyle::Unsupported(other.to_string()),
        }
    }

    pub fn as_config(&self) -> String {
        match self {
            CommentStyle::Block => "/** */".to_string(),
            CommentStyle::LinePrefixed(prefix) => format!("{} ", prefix),
            CommentStyle::Unsupported(other) => other.clone(),
        }
    }
}

/// One parsed documentation comment
///
/// The text fields are filled when the comment is parsed. The symbol fields
/// stay empty until the doc associator links the comment to a construct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentBlock {
    pub raw_content: String,
    pub description: String,
    pub params: BTreeMap<String, String>,
    pub return_desc: String,
    pub tags: Vec<String>,
    pub location: SourceLocation,
    /// Byte offset just past the end of the comment
    pub end_offset: usize,

    pub namespace_path: String,
    pub symbol_name: String,
    pub symbol_type: String,

    pub override_file: Option<String>,
    pub override_class: Option<String>,
    pub override_struct: Option<String>,
    pub override_enum: Option<String>,
}

impl CommentBlock {
    pub fn is_associated(&self) -> bool {
        !self.symbol_name.is_empty()
    }
}

struct TagPatterns {
    param: Regex,
    returns: Regex,
    brief: Regex,
    file: Regex,
    class: Regex,
    structure: Regex,
    enumeration: Regex,
    tag: Regex,
}

impl TagPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            param: Regex::new(r"^[@\\]param\s+(\w+)\s+(.+)")?,
            returns: Regex::new(r"^[@\\]returns?\s+(.+)")?,
            brief: Regex::new(r"^[@\\]brief\s+(.+)")?,
            file: Regex::new(r"^[@\\]file\s+(.+)")?,
            class: Regex::new(r"^[@\\]class\s+(\w+)")?,
            structure: Regex::new(r"^[@\\]struct\s+(\w+)")?,
            enumeration: Regex::new(r"^[@\\]enum\s+(\w+)")?,
            tag: Regex::new(r"^[@\\](\w+)(?:\s+(.+))?")?,
        })
    }
}

/// Scans source text for documentation comments and parses their tags
pub struct CommentParser {
    block_pattern: Option<Regex>,
    tags: Option<TagPatterns>,
}

impl CommentParser {
    pub fn new() -> Self {
        let block_pattern = Regex::new(r"(?s)/\*\*.*?\*/")
            .map_err(|e| warn!("Block comment pattern failed to compile, using plain scanner: {}", e))
            .ok();
        let tags = TagPatterns::compile()
            .map_err(|e| warn!("Tag patterns failed to compile, tags will be ignored: {}", e))
            .ok();

        Self {
            block_pattern,
            tags,
        }
    }

    /// Extract every documentation comment written in `style`
    pub fn extract(&self, content: &str, style: &CommentStyle) -> Vec<CommentBlock> {
        match style {
            CommentStyle::Block => self.extract_block_comments(content),
            CommentStyle::LinePrefixed(prefix) => self.extract_line_comments(content, prefix),
            CommentStyle::Unsupported(other) => {
                debug!("Comment style '{}' is not supported, no comments extracted", other);
                Vec::new()
            }
        }
    }

    fn extract_block_comments(&self, content: &str) -> Vec<CommentBlock> {
        let Some(pattern) = &self.block_pattern else {
            return self.extract_block_comments_simple(content);
        };

        pattern
            .find_iter(content)
            .map(|m| {
                let mut block = self.parse_content(m.as_str());
                block.location = SourceLocation::from_offset(content, m.start());
                block.end_offset = m.end();
                block
            })
            .collect()
    }

    /// Literal scanner used when the block pattern is unavailable
    fn extract_block_comments_simple(&self, content: &str) -> Vec<CommentBlock> {
        let mut blocks = Vec::new();
        let mut pos = 0;

        while let Some(found) = content[pos..].find(BLOCK_OPEN) {
            let start = pos + found;
            let Some(close) = content[start + BLOCK_OPEN.len()..].find(BLOCK_CLOSE) else {
                break;
            };
            let end = start + BLOCK_OPEN.len() + close + BLOCK_CLOSE.len();

            let mut block = self.parse_content(&content[start..end]);
            block.location = SourceLocation::from_offset(content, start);
            block.end_offset = end;
            blocks.push(block);

            pos = end;
        }

        blocks
    }

    fn extract_line_comments(&self, content: &str, prefix: &str) -> Vec<CommentBlock> {
        let mut blocks = Vec::new();
        let mut current = String::new();
        let mut start: Option<SourceLocation> = None;
        let mut end_offset = 0;
        let mut offset = 0;

        for (index, raw_line) in content.split_inclusive('\n').enumerate() {
            let line = raw_line.trim_end_matches(['\n', '\r']);
            let indent = line.len() - line.trim_start().len();

            if let Some(text) = line.trim_start().strip_prefix(prefix) {
                if start.is_none() {
                    start = Some(SourceLocation {
                        line: index + 1,
                        column: indent,
                        byte_offset: offset + indent,
                    });
                    current.clear();
                }
                current.push_str(text);
                current.push('\n');
                end_offset = offset + line.len();
            } else if let Some(location) = start.take() {
                blocks.push(self.finish_line_comment(&current, location, end_offset));
            }

            offset += raw_line.len();
        }

        if let Some(location) = start {
            blocks.push(self.finish_line_comment(&current, location, end_offset));
        }

        blocks
    }

    fn finish_line_comment(&self, text: &str, location: SourceLocation, end_offset: usize) -> CommentBlock {
        let mut block = self.parse_content(&format!("{}{}{}", BLOCK_OPEN, text, BLOCK_CLOSE));
        block.location = location;
        block.end_offset = end_offset;
        block
    }

    /// Parse one raw block comment into its structured parts
    ///
    /// Plain lines only count as description until the first tag line; prose
    /// after a tag is dropped.
    pub fn parse_content(&self, raw: &str) -> CommentBlock {
        let mut block = CommentBlock {
            raw_content: raw.to_string(),
            ..Default::default()
        };

        let cleaned = strip_comment_markers(raw);
        let mut description = String::new();
        let mut in_description = true;

        for line in cleaned.lines() {
            let tag_line = match &self.tags {
                Some(tags) => apply_tag(tags, line, &mut block),
                None => false,
            };

            if tag_line {
                in_description = false;
            } else if in_description && !line.is_empty() {
                description.push_str(line);
                description.push('\n');
            }
        }

        // A @brief seen before any prose is kept; otherwise the collected prose wins
        let description = description.trim();
        if block.description.is_empty() || !description.is_empty() {
            block.description = description.to_string();
        }
        block
    }
}

impl Default for CommentParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true when `line` carried a tag
fn apply_tag(tags: &TagPatterns, line: &str, block: &mut CommentBlock) -> bool {
    if let Some(caps) = tags.param.captures(line) {
        block.params.insert(caps[1].to_string(), caps[2].trim().to_string());
    } else if let Some(caps) = tags.returns.captures(line) {
        block.return_desc = caps[1].trim().to_string();
    } else if let Some(caps) = tags.brief.captures(line) {
        if block.description.is_empty() {
            block.description = caps[1].trim().to_string();
        }
    } else if let Some(caps) = tags.file.captures(line) {
        block.override_file = Some(caps[1].trim().to_string());
    } else if let Some(caps) = tags.class.captures(line) {
        block.override_class = Some(caps[1].to_string());
    } else if let Some(caps) = tags.structure.captures(line) {
        block.override_struct = Some(caps[1].to_string());
    } else if let Some(caps) = tags.enumeration.captures(line) {
        block.override_enum = Some(caps[1].to_string());
    } else if let Some(caps) = tags.tag.captures(line) {
        let name = &caps[1];
        if !matches!(name, "file" | "class" | "struct" | "enum") {
            match caps.get(2) {
                Some(rest) => block.tags.push(format!("{}: {}", name, rest.as_str())),
                None => block.tags.push(name.to_string()),
            }
        }
    } else {
        return false;
    }
    true
}

/// Remove `/**`, `*/` and the per-line `*` decoration from a raw comment
pub fn strip_comment_markers(raw: &str) -> String {
    let inner = raw.strip_prefix(BLOCK_OPEN).unwrap_or(raw);
    let inner = inner.strip_suffix(BLOCK_CLOSE).unwrap_or(inner);

    let mut cleaned = String::with_capacity(inner.len());
    for line in inner.lines() {
        let line = line.trim_start_matches([' ', '\t']);
        let line = match line.strip_prefix('*') {
            Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
            None => line,
        };
        cleaned.push_str(line);
        cleaned.push('\n');
    }
    cleaned
}
