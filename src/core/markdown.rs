//! Markdown page emission
//!
//! One page per construct (or per associated comment block on the legacy
//! path), rendered through tera templates with YAML front matter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};
use tracing::{debug, warn};

use super::comments::{CommentBlock, CommentParser, CommentStyle};
use super::construct::{Construct, ConstructKind, Parameter};
use crate::config::OutputConfig;
use crate::error::Result;

const CONSTRUCT_TEMPLATE: &str = r#"---
type: {{ construct.kind }}
{% if construct.namespace_path %}namespace: {{ construct.namespace_path }}
{% endif %}name: {{ construct.name }}
full_name: {{ construct.full_name }}
start_line: {{ construct.start_line }}
end_line: {{ construct.end_line }}
file: {{ construct.source_file }}
{% if construct.return_type %}return_type: {{ construct.return_type }}
{% endif %}{% if construct.is_merged %}is_merged: true
{% if construct.source_locations %}source_locations:
{% for location in construct.source_locations %}  - {{ location }}
{% endfor %}{% endif %}{% endif %}---

# {{ construct.name }}

*{{ construct.kind }}{% if construct.namespace_path %} in {{ construct.namespace_path }}{% endif %}*

{% if signature %}## Signature

```cpp
{{ signature }}
```

{% endif %}{% if parameters %}## Parameters

| Name | Type | Description |
|------|------|-------------|
{% for param in parameters %}| `{{ param.name }}` | `{{ param.param_type }}` | {{ param.description }} |
{% endfor %}
{% endif %}{% if returns %}## Returns

`{{ returns.return_type }}`

{{ returns.description }}

{% endif %}## Documentation

{% if documented %}{% if docs.text %}{{ docs.text }}

{% endif %}{% else %}*No documentation available. This {{ construct.kind }} was automatically discovered from the source code.*

{% endif %}{% if docs.tags %}## Additional Information

{% for tag in docs.tags %}- {{ tag }}
{% endfor %}
{% endif %}## Source

**File:** `{{ construct.source_file }}`

**Lines:** {{ construct.start_line }}-{{ construct.end_line }}
"#;

const COMMENT_TEMPLATE: &str = r#"---
type: {{ block.symbol_type }}
{% if block.namespace_path %}namespace: {{ block.namespace_path }}
{% endif %}name: {{ block.symbol_name }}
line: {{ block.location.line }}
{% if parent %}parent: {{ parent }}
{% endif %}---

# {{ block.symbol_name }}

{% if block.description %}{{ block.description }}

{% endif %}{% if block.params %}## Parameters

{% for name, description in block.params %}- **{{ name }}**: {{ description }}
{% endfor %}
{% endif %}{% if block.return_desc %}## Returns

{{ block.return_desc }}

{% endif %}{% if block.tags %}## Additional Information

{% for tag in block.tags %}- {{ tag }}
{% endfor %}{% endif %}"#;

const UNDESCRIBED: &str = "*(No description available)*";

/// Documentation recovered from a construct's docstring
#[derive(Debug, Default, Serialize)]
struct Documentation {
    text: String,
    params: BTreeMap<String, String>,
    returns: String,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ParameterRow {
    name: String,
    param_type: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct Returns {
    return_type: String,
    description: String,
}

/// Writes markdown pages for constructs and comment blocks
pub struct MarkdownEmitter {
    tera: Tera,
    comment_parser: CommentParser,
    options: OutputConfig,
}

impl MarkdownEmitter {
    pub fn new(options: &OutputConfig) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("construct.md", CONSTRUCT_TEMPLATE)?;
        tera.add_raw_template("comment.md", COMMENT_TEMPLATE)?;

        Ok(Self {
            tera,
            comment_parser: CommentParser::new(),
            options: options.clone(),
        })
    }

    /// Whether a construct gets a page under the output options
    pub fn should_emit(&self, construct: &Construct) -> bool {
        if self.options.skip_unnamed && construct.is_unnamed() {
            return false;
        }
        self.options.include_undocumented || construct.has_docstring()
    }

    /// Write one page per construct into `output_dir`
    ///
    /// Returns the paths written. A page that fails to render or write is
    /// logged and skipped.
    pub fn write_constructs(&self, constructs: &[Construct], output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;

        let mut written = Vec::new();
        for construct in constructs.iter().filter(|c| self.should_emit(c)) {
            let path = output_dir.join(construct_filename(construct));
            match self.render_construct(construct) {
                Ok(page) => match std::fs::write(&path, page) {
                    Ok(()) => {
                        debug!("Wrote {}", path.display());
                        written.push(path);
                    }
                    Err(e) => warn!("Failed to write {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to render page for '{}': {}", construct.full_name, e),
            }
        }

        Ok(written)
    }

    /// Write one page per associated comment block into `output_dir`
    pub fn write_comment_blocks(&self, blocks: &[CommentBlock], output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;

        let mut written = Vec::new();
        let mut skipped = 0;
        for block in blocks {
            if !block.is_associated() {
                skipped += 1;
                continue;
            }

            let path = output_dir.join(comment_filename(block));
            match self.render_comment_block(block) {
                Ok(page) => match std::fs::write(&path, page) {
                    Ok(()) => written.push(path),
                    Err(e) => warn!("Failed to write {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to render page for '{}': {}", block.symbol_name, e),
            }
        }

        debug!("Wrote {} comment pages, skipped {} unassociated blocks", written.len(), skipped);
        Ok(written)
    }

    pub fn render_construct(&self, construct: &Construct) -> Result<String> {
        let docs = construct
            .docstring
            .as_deref()
            .map(|doc| self.documentation(doc))
            .unwrap_or_default();

        let parameters: Vec<ParameterRow> = construct
            .parameters
            .iter()
            .map(|param| ParameterRow {
                name: param.name.clone(),
                param_type: param.param_type.clone(),
                description: parameter_description(param, docs.params.get(&param.name)),
            })
            .collect();

        let returns = construct
            .return_type
            .as_deref()
            .filter(|ty| *ty != "void")
            .map(|ty| Returns {
                return_type: ty.to_string(),
                description: if docs.returns.is_empty() {
                    UNDESCRIBED.to_string()
                } else {
                    docs.returns.clone()
                },
            });

        let signature = construct.kind.is_callable().then(|| format_signature(construct));

        let mut context = Context::new();
        context.insert("construct", construct);
        context.insert("signature", &signature);
        context.insert("parameters", &parameters);
        context.insert("returns", &returns);
        context.insert("documented", &construct.has_docstring());
        context.insert("docs", &docs);

        Ok(self.tera.render("construct.md", &context)?)
    }

    pub fn render_comment_block(&self, block: &CommentBlock) -> Result<String> {
        let parent = block
            .namespace_path
            .rsplit_once("::")
            .map(|(parent, _)| parent.to_string());

        let mut context = Context::new();
        context.insert("block", block);
        context.insert("parent", &parent);

        Ok(self.tera.render("comment.md", &context)?)
    }

    /// Split a docstring into prose, parameter docs, return doc and tags
    ///
    /// Raw `/** */` comments are parsed; merged docstrings hold several. Plain
    /// text is used as-is.
    fn documentation(&self, docstring: &str) -> Documentation {
        if !docstring.contains("/**") {
            return Documentation {
                text: docstring.trim().to_string(),
                ..Default::default()
            };
        }

        let mut docs = Documentation::default();
        let mut texts = Vec::new();
        for block in self.comment_parser.extract(docstring, &CommentStyle::Block) {
            if !block.description.is_empty() {
                texts.push(block.description);
            }
            for (name, description) in block.params {
                docs.params.entry(name).or_insert(description);
            }
            if docs.returns.is_empty() {
                docs.returns = block.return_desc;
            }
            docs.tags.extend(block.tags);
        }
        docs.text = texts.join("\n\n");
        docs
    }
}

fn parameter_description(param: &Parameter, documented: Option<&String>) -> String {
    match (documented, &param.default_value) {
        (Some(description), Some(default)) => format!("{} *(default: `{}`)*", description, default),
        (Some(description), None) => description.clone(),
        (None, Some(default)) => format!("*Default: `{}`*", default),
        (None, None) => UNDESCRIBED.to_string(),
    }
}

/// Declaration-style signature of a callable construct
pub fn format_signature(construct: &Construct) -> String {
    let mut signature = String::new();

    if construct.is_static {
        signature.push_str("static ");
    }
    if construct.is_virtual {
        signature.push_str("virtual ");
    }
    if let Some(return_type) = &construct.return_type {
        if !matches!(construct.kind, ConstructKind::Constructor | ConstructKind::Destructor) {
            signature.push_str(return_type);
            signature.push(' ');
        }
    }

    signature.push_str(&construct.name);
    signature.push('(');
    let params: Vec<String> = construct
        .parameters
        .iter()
        .map(|param| {
            let mut text = param.param_type.clone();
            if !param.name.is_empty() {
                text.push(' ');
                text.push_str(&param.name);
            }
            if let Some(default) = &param.default_value {
                text.push_str(" = ");
                text.push_str(default);
            }
            text
        })
        .collect();
    signature.push_str(&params.join(", "));
    signature.push(')');

    if construct.is_const {
        signature.push_str(" const");
    }
    signature
}

/// Page filename for a construct: `a::B::f` becomes `a.B.f.md`
pub fn construct_filename(construct: &Construct) -> String {
    let name = if !construct.full_name.is_empty() {
        construct.full_name.clone()
    } else if !construct.name.is_empty() {
        construct.name.clone()
    } else {
        format!("unnamed_{}", construct.kind)
    };

    let mut dotted = name.replace(':', ".");
    while dotted.contains("..") {
        dotted = dotted.replace("..", ".");
    }

    format!("{}.md", escape_symbols_for_filename(&dotted).replace(' ', "_"))
}

/// Page filename for an associated comment block: `ns::Foo` becomes `ns--Foo.md`
pub fn comment_filename(block: &CommentBlock) -> String {
    let name = match (block.namespace_path.is_empty(), block.symbol_name.is_empty()) {
        (false, false) => format!("{}::{}", block.namespace_path, block.symbol_name),
        (_, false) => block.symbol_name.clone(),
        (_, true) => "unnamed".to_string(),
    };

    let name = escape_symbols_for_filename(&name.replace(':', "-").replace(' ', "_"));
    format!("{}.md", name)
}

/// Escape characters that are not allowed in file names on common platforms
pub fn escape_symbols_for_filename(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '<' => escaped.push_str("%lt"),
            '>' => escaped.push_str("%gt"),
            '"' => escaped.push_str("%quote"),
            '|' => escaped.push_str("%pipe"),
            '?' => escaped.push_str("%quest"),
            '*' => escaped.push_str("%star"),
            '\\' => escaped.push_str("%bslash"),
            '/' => escaped.push_str("%slash"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comments::SourceLocation;
    use predicates::prelude::*;

    fn emitter() -> MarkdownEmitter {
        MarkdownEmitter::new(&OutputConfig::default()).unwrap()
    }

    fn method() -> Construct {
        let mut construct = Construct::new(ConstructKind::Method, "area", "shape.h");
        construct.full_name = "geo::Shape::area".to_string();
        construct.namespace_path = "geo::Shape".to_string();
        construct.return_type = Some("double".to_string());
        construct.is_const = true;
        construct.start_line = 12;
        construct.end_line = 12;
        construct.parameters.push(Parameter {
            param_type: "int".to_string(),
            name: "precision".to_string(),
            default_value: Some("2".to_string()),
        });
        construct.docstring = Some(
            "/**\n * Area of the shape\n * @param precision Digits kept\n * @return The area\n * @since 2.0\n */"
                .to_string(),
        );
        construct
    }

    #[test]
    fn test_construct_filenames() {
        assert_eq!(construct_filename(&method()), "geo.Shape.area.md");

        let mut op = Construct::new(ConstructKind::Method, "operator<", "a.h");
        op.full_name = "Vec::operator<".to_string();
        assert_eq!(construct_filename(&op), "Vec.operator%lt.md");

        let mut call = Construct::new(ConstructKind::Method, "operator()", "a.h");
        call.full_name = "Fn::operator()".to_string();
        assert_eq!(construct_filename(&call), "Fn.operator().md");

        let mut conversion = Construct::new(ConstructKind::Method, "operator bool", "a.h");
        conversion.full_name = "Flag::operator bool".to_string();
        assert_eq!(construct_filename(&conversion), "Flag.operator_bool.md");

        let unnamed = Construct::new(ConstructKind::Struct, "", "a.h");
        assert_eq!(construct_filename(&unnamed), "unnamed_struct.md");

        let mut div = Construct::new(ConstructKind::Function, "operator/", "a.h");
        div.full_name = "operator/".to_string();
        assert_eq!(construct_filename(&div), "operator%slash.md");
    }

    #[test]
    fn test_render_construct_page() {
        let page = emitter().render_construct(&method()).unwrap();

        assert!(page.starts_with("---\ntype: method\nnamespace: geo::Shape\nname: area\n"));
        assert!(page.contains("full_name: geo::Shape::area\n"));
        assert!(page.contains("return_type: double\n"));
        assert!(!page.contains("is_merged"));
        assert!(page.contains("# area\n"));
        assert!(page.contains("*method in geo::Shape*"));
        assert!(page.contains("double area(int precision = 2) const"));
        assert!(page.contains("| `precision` | `int` | Digits kept *(default: `2`)* |"));
        assert!(page.contains("`double`\n\nThe area"));
        assert!(page.contains("## Documentation\n\nArea of the shape\n"));
        assert!(page.contains("- since: 2.0"));
        assert!(page.contains("**Lines:** 12-12"));
    }

    #[test]
    fn test_render_merged_and_undocumented() {
        let mut construct = Construct::new(ConstructKind::Class, "Widget", "widget.h");
        construct.is_merged = true;
        construct.source_locations = vec!["widget.h:3".to_string(), "widget.cpp:1".to_string()];

        let page = emitter().render_construct(&construct).unwrap();
        assert!(page.contains("is_merged: true\nsource_locations:\n  - widget.h:3\n  - widget.cpp:1\n---"));
        assert!(page.contains("*No documentation available. This class was automatically discovered"));
        assert!(!page.contains("## Signature"));
        assert!(!page.contains("## Returns"));
    }

    #[test]
    fn test_plain_docstring_rendered_verbatim() {
        let mut construct = Construct::new(ConstructKind::Function, "run", "main.cpp");
        construct.return_type = Some("void".to_string());
        construct.docstring = Some("Runs everything".to_string());

        let page = emitter().render_construct(&construct).unwrap();
        assert!(page.contains("## Documentation\n\nRuns everything\n"));
        assert!(page.contains("void run()"));
        assert!(!page.contains("## Returns"));
    }

    #[test]
    fn test_write_constructs_honours_options() {
        let temp = tempfile::tempdir().unwrap();
        let undocumented = Construct::new(ConstructKind::Function, "bare", "a.cpp");
        let unnamed = Construct::new(ConstructKind::Enum, "", "a.cpp");
        let constructs = vec![method(), undocumented, unnamed];

        let written = emitter().write_constructs(&constructs, temp.path()).unwrap();
        assert_eq!(written.len(), 3);

        let strict = MarkdownEmitter::new(&OutputConfig {
            include_undocumented: false,
            skip_unnamed: true,
        })
        .unwrap();
        let out = temp.path().join("strict");
        let written = strict.write_constructs(&constructs, &out).unwrap();
        assert_eq!(written, vec![out.join("geo.Shape.area.md")]);
        assert!(predicate::path::is_file().eval(&out.join("geo.Shape.area.md")));
        assert!(predicate::path::missing().eval(&out.join("bare.md")));
    }

    #[test]
    fn test_comment_pages() {
        let temp = tempfile::tempdir().unwrap();
        let mut params = BTreeMap::new();
        params.insert("a".to_string(), "First".to_string());

        let documented = CommentBlock {
            description: "A simple test function".to_string(),
            params,
            return_desc: "Nothing".to_string(),
            location: SourceLocation {
                line: 42,
                column: 0,
                byte_offset: 0,
            },
            namespace_path: "MyNamespace::Inner".to_string(),
            symbol_name: "testFunction".to_string(),
            symbol_type: "function_definition".to_string(),
            ..Default::default()
        };
        let orphan = CommentBlock::default();

        let written = emitter()
            .write_comment_blocks(&[documented, orphan], temp.path())
            .unwrap();
        assert_eq!(written.len(), 1);

        let path = temp.path().join("MyNamespace--Inner--testFunction.md");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("type: function_definition\n"));
        assert!(content.contains("name: testFunction\n"));
        assert!(content.contains("line: 42\n"));
        assert!(content.contains("parent: MyNamespace\n"));
        assert!(content.contains("# testFunction\n\nA simple test function"));
        assert!(content.contains("- **a**: First"));
        assert!(content.contains("## Returns\n\nNothing"));
    }
}
