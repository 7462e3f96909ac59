//! Name recovery for callable constructs.
//!
//! The C++ grammar does not expose a clean declarator for every spelling of an
//! operator overload or inline method, so names are recovered by an ordered
//! list of strategies. Each strategy is a plain function over the node and the
//! source text; the first one that yields a non-empty name wins.

use tree_sitter::Node;

use super::syntax::{function_declarator_of, node_text};

pub const SCOPE_SEPARATOR: &str = "::";
const OPERATOR_KEYWORD: &str = "operator";

pub type NameStrategy = fn(Node, &str) -> Option<String>;

/// Strategies tried, in order, for function definitions
pub const FUNCTION_NAME_STRATEGIES: [(&str, NameStrategy); 4] = [
    ("qualified_declarator", qualified_declarator),
    ("declarator_text", declarator_text),
    ("operator_scan", operator_scan),
    ("trailing_identifier", trailing_identifier),
];

/// A recovered name split at its last scope separator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualifiedName {
    pub namespace_path: String,
    pub name: String,
    pub full_name: String,
}

impl QualifiedName {
    /// Split `text` at the last `::` that precedes any `operator` keyword
    pub fn split(text: &str) -> Self {
        let text = text.trim();
        let searchable = match find_operator_keyword(text) {
            Some(pos) => &text[..pos],
            None => text,
        };

        match searchable.rfind(SCOPE_SEPARATOR) {
            Some(pos) => Self {
                namespace_path: text[..pos].to_string(),
                name: text[pos + SCOPE_SEPARATOR.len()..].to_string(),
                full_name: text.to_string(),
            },
            None => Self {
                namespace_path: String::new(),
                name: text.to_string(),
                full_name: text.to_string(),
            },
        }
    }

    pub fn is_qualified(&self) -> bool {
        !self.namespace_path.is_empty()
    }

    /// Attach the enclosing scope of the walk
    ///
    /// Unqualified names take the scope as their namespace path. Qualified
    /// names written inside a namespace get that namespace prefixed unless
    /// they already spell it out.
    pub fn within(mut self, scope: &str) -> Self {
        if scope.is_empty() || self.name.is_empty() {
            return self;
        }

        if !self.is_qualified() {
            self.namespace_path = scope.to_string();
            self.full_name = format!("{}{}{}", scope, SCOPE_SEPARATOR, self.name);
        } else if self.namespace_path != scope
            && !self.namespace_path.starts_with(&format!("{}{}", scope, SCOPE_SEPARATOR))
        {
            self.namespace_path = format!("{}{}{}", scope, SCOPE_SEPARATOR, self.namespace_path);
            self.full_name = format!("{}{}{}", self.namespace_path, SCOPE_SEPARATOR, self.name);
        }
        self
    }
}

/// Run [`FUNCTION_NAME_STRATEGIES`] in order
pub fn recover_function_name(node: Node, source: &str) -> Option<String> {
    FUNCTION_NAME_STRATEGIES.iter().find_map(|(_, strategy)| {
        strategy(node, source).filter(|name| !name.trim().is_empty())
    })
}

/// `Class::method` spelled as a qualified identifier inside the declarator
pub fn qualified_declarator(node: Node, source: &str) -> Option<String> {
    let declarator = function_declarator_of(node)?;
    let name = declarator.child_by_field_name("declarator")?;
    (name.kind() == "qualified_identifier").then(|| node_text(name, source))
}

/// The declarator's own text, read up to its parameter list
pub fn declarator_text(node: Node, source: &str) -> Option<String> {
    let declarator = function_declarator_of(node)?;
    let text = node_text(declarator, source);
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "()" {
        return None;
    }
    extract_function_name_from_text(trimmed)
}

/// Whole-node scan for an `operator` keyword
pub fn operator_scan(node: Node, source: &str) -> Option<String> {
    operator_name_from_text(&node_text(node, source))
}

/// Whole-node scan for the identifier run right before the first `(`
pub fn trailing_identifier(node: Node, source: &str) -> Option<String> {
    identifier_before_paren(&node_text(node, source))
}

/// Name a method declaration from its `function_declarator`
pub fn declared_method_name(declarator: Node, source: &str) -> Option<String> {
    let direct = declarator.child_by_field_name("declarator").and_then(|name| match name.kind() {
        "identifier" | "field_identifier" | "destructor_name" | "operator_name"
        | "qualified_identifier" | "template_function" | "template_method" => {
            Some(node_text(name, source))
        }
        _ => None,
    });

    direct
        .filter(|name| !name.trim().is_empty())
        .or_else(|| extract_function_name_from_text(&node_text(declarator, source)))
}

/// Recover a callable's name from declarator-like text
///
/// Keeps class qualification and operator symbols, drops the parameter list
/// and anything after it:
/// `JsonDoc::operator=(JsonDoc&& other) noexcept` gives `JsonDoc::operator=`.
pub fn extract_function_name_from_text(text: &str) -> Option<String> {
    operator_name_from_text(text).or_else(|| identifier_before_paren(text))
}

fn operator_name_from_text(text: &str) -> Option<String> {
    let keyword = find_operator_keyword(text)?;
    let after_keyword = keyword + OPERATOR_KEYWORD.len();

    // operator() has its own parentheses before the parameter list
    let rest = &text[after_keyword..];
    let symbol_start = after_keyword + (rest.len() - rest.trim_start().len());
    let search_from = if text[symbol_start..].starts_with("()") {
        symbol_start + 2
    } else {
        symbol_start
    };
    let end = text[search_from..]
        .find('(')
        .map(|pos| search_from + pos)
        .unwrap_or(text.len());

    let start = qualified_run_start(text, keyword);
    let name = text[start..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn identifier_before_paren(text: &str) -> Option<String> {
    let paren = text.find('(')?;
    let head = text[..paren].trim_end();
    let start = qualified_run_start(head, head.len());
    let name = &head[start..];
    let name = name.trim_start_matches(':');
    (!name.is_empty() && name != "~").then(|| name.to_string())
}

/// Byte offset where the run of name characters ending at `end` begins
fn qualified_run_start(text: &str, end: usize) -> usize {
    text[..end]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_name_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(end)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '~' | '<' | '>')
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Offset of the first standalone `operator` keyword
fn find_operator_keyword(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = text[from..].find(OPERATOR_KEYWORD) {
        let pos = from + found;
        let end = pos + OPERATOR_KEYWORD.len();
        let before_ok = text[..pos].chars().next_back().map_or(true, |c| !is_ident_char(c));
        let after_ok = text[end..].chars().next().map_or(true, |c| !is_ident_char(c));
        if before_ok && after_ok {
            return Some(pos);
        }
        from = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::syntax::test_support::parse_cpp;
    use super::*;

    #[test]
    fn test_operator_names_from_text() {
        assert_eq!(
            extract_function_name_from_text("JsonDoc::operator=(JsonDoc&& other) noexcept").as_deref(),
            Some("JsonDoc::operator=")
        );
        assert_eq!(
            extract_function_name_from_text("operator=(const JsonDoc& other)").as_deref(),
            Some("operator=")
        );
        assert_eq!(
            extract_function_name_from_text("JsonValue::operator[](const std::string& key) const").as_deref(),
            Some("JsonValue::operator[]")
        );
        assert_eq!(
            extract_function_name_from_text("operator[](const std::string& key) const").as_deref(),
            Some("operator[]")
        );
        assert_eq!(extract_function_name_from_text("operator()(int x)").as_deref(), Some("operator()"));
        assert_eq!(
            extract_function_name_from_text("Matrix::operator<<(std::ostream& os)").as_deref(),
            Some("Matrix::operator<<")
        );
    }

    #[test]
    fn test_plain_and_destructor_names_from_text() {
        assert_eq!(extract_function_name_from_text("someFunction(int a, int b)").as_deref(), Some("someFunction"));
        assert_eq!(extract_function_name_from_text("~JsonDoc()").as_deref(), Some("~JsonDoc"));
        assert_eq!(extract_function_name_from_text("JsonDoc::~JsonDoc()").as_deref(), Some("JsonDoc::~JsonDoc"));
        assert_eq!(extract_function_name_from_text("operatorCount(int a)").as_deref(), Some("operatorCount"));
        assert_eq!(extract_function_name_from_text("no parens here"), None);
    }

    #[test]
    fn test_split_keeps_operator_scope() {
        let name = QualifiedName::split("JsonDoc::operator=");
        assert_eq!(name.namespace_path, "JsonDoc");
        assert_eq!(name.name, "operator=");
        assert_eq!(name.full_name, "JsonDoc::operator=");

        let conversion = QualifiedName::split("Value::operator std::string");
        assert_eq!(conversion.namespace_path, "Value");
        assert_eq!(conversion.name, "operator std::string");

        let nested = QualifiedName::split("a::b::Widget::draw");
        assert_eq!(nested.namespace_path, "a::b::Widget");
        assert_eq!(nested.name, "draw");
    }

    #[test]
    fn test_within_scope() {
        let plain = QualifiedName::split("draw").within("gfx::Widget");
        assert_eq!(plain.full_name, "gfx::Widget::draw");
        assert_eq!(plain.namespace_path, "gfx::Widget");

        let qualified = QualifiedName::split("Widget::draw").within("gfx");
        assert_eq!(qualified.full_name, "gfx::Widget::draw");

        let spelled_out = QualifiedName::split("gfx::Widget::draw").within("gfx");
        assert_eq!(spelled_out.full_name, "gfx::Widget::draw");

        let top_level = QualifiedName::split("Foo::bar").within("");
        assert_eq!(top_level.full_name, "Foo::bar");
    }

    #[test]
    fn test_strategies_on_parsed_definitions() {
        let source = "JsonDoc& JsonDoc::operator=(JsonDoc&& other) noexcept { return *this; }";
        let tree = parse_cpp(source);
        let definition = tree.root_node().child(0).unwrap();
        assert_eq!(qualified_declarator(definition, source).as_deref(), Some("JsonDoc::operator="));
        assert_eq!(recover_function_name(definition, source).as_deref(), Some("JsonDoc::operator="));

        let source = "int add(int a, int b) { return a + b; }";
        let tree = parse_cpp(source);
        let definition = tree.root_node().child(0).unwrap();
        assert_eq!(qualified_declarator(definition, source), None);
        assert_eq!(declarator_text(definition, source).as_deref(), Some("add"));
        assert_eq!(recover_function_name(definition, source).as_deref(), Some("add"));
    }

    #[test]
    fn test_whole_node_fallbacks() {
        let source = "struct V { explicit operator bool() const { return true; } };";
        let tree = parse_cpp(source);
        let root = tree.root_node();
        let definition = super::super::syntax::find_descendant_by_kind(root, &["function_definition"]).unwrap();

        assert_eq!(operator_scan(definition, source).as_deref(), Some("operator bool"));
        assert_eq!(recover_function_name(definition, source).as_deref(), Some("operator bool"));
        assert_eq!(trailing_identifier(definition, source).as_deref(), Some("bool"));
    }
}
