//! Linking documentation comments with the constructs they document.
//!
//! A construct asks [`AssociationStrategy::docstring`] for its documentation,
//! either through a small byte window before it (during extraction) or through
//! the parsed comments a few lines above it (the fallback afterwards). The doc
//! associator goes the other way: each comment finds the nearest construct
//! node after it through [`FollowingNodeIndex`].

use tree_sitter::{Node, Query, QueryCursor, Tree};
use tracing::{debug, warn};

use super::comments::CommentBlock;
use super::naming::{recover_function_name, SCOPE_SEPARATOR};
use super::syntax::{children, find_child_by_kind, function_declarator_of, node_text};

/// Bytes searched before a construct for its comment
pub const PROXIMITY_WINDOW: usize = 100;

/// Lines a comment may sit above the construct it documents
pub const MAX_LINES_ABOVE: usize = 10;

/// Node kinds a comment can be associated with
pub const CONSTRUCT_NODE_KINDS: [&str; 5] = [
    "function_definition",
    "class_specifier",
    "namespace_definition",
    "struct_specifier",
    "enum_specifier",
];

const SCOPE_NODE_KINDS: [&str; 3] = ["namespace_definition", "class_specifier", "struct_specifier"];

/// How a construct looks for the comment documenting it
#[derive(Debug, Clone, Copy)]
pub enum AssociationStrategy<'a> {
    /// Look back [`PROXIMITY_WINDOW`] bytes from `node_start` for a block comment
    ProximityWindow { source: &'a str, node_start: usize },
    /// Take a parsed comment at most [`MAX_LINES_ABOVE`] lines above `line`
    LineProximity { blocks: &'a [CommentBlock], line: usize },
}

impl AssociationStrategy<'_> {
    /// Docstring found under this strategy
    ///
    /// The byte window yields the raw comment; line proximity yields the
    /// parsed description, or the raw comment when it has none.
    pub fn docstring(&self) -> Option<String> {
        match *self {
            AssociationStrategy::ProximityWindow { source, node_start } => {
                comment_before(source, node_start).map(str::to_string)
            }
            AssociationStrategy::LineProximity { blocks, line } => comment_above(blocks, line).map(docstring_text),
        }
    }
}

/// The `/** ... */` span ending before `node_start`, if one opens within the window
///
/// A comment separated from the node by the end of another statement or
/// block belongs to that statement, not to the node.
fn comment_before(source: &str, node_start: usize) -> Option<&str> {
    let bytes = source.as_bytes();
    let node_start = node_start.min(bytes.len());
    let window_start = node_start.saturating_sub(PROXIMITY_WINDOW);
    let window = &bytes[window_start..node_start];

    let open = window_start + rfind_bytes(window, b"/**")?;
    let close = open + find_bytes(&bytes[open..node_start], b"*/")? + 2;

    if bytes[close..node_start].iter().any(|b| matches!(b, b';' | b'{' | b'}')) {
        return None;
    }

    source.get(open..close)
}

/// Closest comment that starts above `line` and no more than [`MAX_LINES_ABOVE`] lines up
fn comment_above(blocks: &[CommentBlock], line: usize) -> Option<&CommentBlock> {
    blocks
        .iter()
        .filter(|block| block.location.line < line && line - block.location.line <= MAX_LINES_ABOVE)
        .max_by_key(|block| block.location.line)
}

/// Docstring text a matched comment contributes to a construct
fn docstring_text(block: &CommentBlock) -> String {
    if block.description.is_empty() {
        block.raw_content.clone()
    } else {
        block.description.clone()
    }
}

/// Construct nodes of one tree, ordered by start offset
pub struct FollowingNodeIndex<'tree> {
    nodes: Vec<Node<'tree>>,
}

impl<'tree> FollowingNodeIndex<'tree> {
    /// Collect every construct node with a structural query
    ///
    /// Kinds the tree's grammar does not define are left out of the query.
    /// If the query cannot be compiled the tree is walked instead.
    pub fn new(tree: &'tree Tree, source: &str) -> Self {
        let language = tree.language();
        let kinds: Vec<&str> = CONSTRUCT_NODE_KINDS
            .iter()
            .copied()
            .filter(|kind| language.id_for_node_kind(kind, true) != 0)
            .collect();

        let pattern = kinds
            .iter()
            .map(|kind| format!("({}) @construct", kind))
            .collect::<Vec<_>>()
            .join("\n");

        let mut nodes = match Query::new(&language, &pattern) {
            Ok(query) => {
                let mut cursor = QueryCursor::new();
                cursor
                    .matches(&query, tree.root_node(), source.as_bytes())
                    .flat_map(|m| m.captures.iter().map(|capture| capture.node).collect::<Vec<_>>())
                    .collect::<Vec<_>>()
            }
            Err(e) => {
                warn!("Construct query failed to compile, walking the tree instead: {}", e);
                let mut found = Vec::new();
                collect_kinds(tree.root_node(), &kinds, &mut found);
                found
            }
        };

        nodes.sort_by_key(|node| node.start_byte());
        nodes.dedup_by_key(|node| node.id());
        debug!("Indexed {} construct nodes", nodes.len());

        Self { nodes }
    }

    /// Nearest construct node starting at or after `offset`
    pub fn nearest_after(&self, offset: usize) -> Option<Node<'tree>> {
        let index = self.nodes.partition_point(|node| node.start_byte() < offset);
        self.nodes.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn collect_kinds<'tree>(node: Node<'tree>, kinds: &[&str], found: &mut Vec<Node<'tree>>) {
    if kinds.contains(&node.kind()) {
        found.push(node);
    }
    for child in children(node) {
        collect_kinds(child, kinds, found);
    }
}

/// Enclosing namespace and class names of `node`, outermost first
pub fn scope_path(node: Node, source: &str) -> String {
    let mut scopes = Vec::new();
    let mut current = node.parent();

    while let Some(ancestor) = current {
        if SCOPE_NODE_KINDS.contains(&ancestor.kind()) {
            let name = declared_name(ancestor, source);
            if !name.is_empty() {
                scopes.push(name);
            }
        }
        current = ancestor.parent();
    }

    scopes.reverse();
    scopes.join(SCOPE_SEPARATOR)
}

/// Name of the symbol a construct node declares
pub fn symbol_name(node: Node, source: &str) -> String {
    if node.kind() == "function_definition" {
        let from_declarator = function_declarator_of(node)
            .and_then(|declarator| declarator.child_by_field_name("declarator"))
            .filter(|name| {
                matches!(
                    name.kind(),
                    "qualified_identifier" | "identifier" | "field_identifier" | "destructor_name" | "operator_name"
                )
            })
            .map(|name| node_text(name, source));

        return from_declarator
            .or_else(|| recover_function_name(node, source))
            .unwrap_or_default();
    }

    declared_name(node, source)
}

/// Name of a namespace, class, struct or enum node
pub fn declared_name(node: Node, source: &str) -> String {
    node.child_by_field_name("name")
        .or_else(|| {
            find_child_by_kind(
                node,
                &["identifier", "type_identifier", "namespace_identifier", "nested_namespace_specifier"],
            )
        })
        .map(|name| node_text(name, source))
        .unwrap_or_default()
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::super::comments::{CommentParser, CommentStyle};
    use super::super::syntax::test_support::parse_cpp;
    use super::*;

    #[test]
    fn test_comment_before_inside_window() {
        let source = "/** Adds */\nint add(int a, int b);";
        let start = source.find("int").unwrap();
        assert_eq!(comment_before(source, start), Some("/** Adds */"));
    }

    #[test]
    fn test_comment_before_near_file_start() {
        // Constructs within the first hundred bytes still see their comment
        let source = "/** A */ void a();";
        assert_eq!(comment_before(source, 9), Some("/** A */"));
        assert_eq!(comment_before(source, 0), None);
    }

    #[test]
    fn test_comment_before_outside_window() {
        let padding = " ".repeat(PROXIMITY_WINDOW + 1);
        let source = format!("/** Far */{}void f();", padding);
        let start = source.find("void").unwrap();
        assert_eq!(comment_before(&source, start), None);
    }

    #[test]
    fn test_comment_before_belongs_to_previous_statement() {
        let source = "/** A */ void a();\nvoid b();";
        assert_eq!(comment_before(source, source.find("void b").unwrap()), None);

        let source = "/** Max */\ntemplate <typename T>\nT max(T a, T b);";
        assert_eq!(comment_before(source, source.find("T max").unwrap()), Some("/** Max */"));
    }

    #[test]
    fn test_unterminated_comment_before_node() {
        let source = "/** open\nvoid f();";
        assert_eq!(comment_before(source, source.find("void").unwrap()), None);
    }

    #[test]
    fn test_comment_above_picks_closest() {
        let parser = CommentParser::new();
        let source = "/** One */\n\n/** Two */\n\n\nint x();\n";
        let blocks = parser.extract(source, &CommentStyle::Block);

        let found = comment_above(&blocks, 6).unwrap();
        assert_eq!(found.description, "Two");
        assert!(comment_above(&blocks, 1).is_none());
        assert!(comment_above(&blocks, 14).is_none());
    }

    #[test]
    fn test_strategy_window_keeps_raw_comment() {
        let source = "/** Adds */\nint add(int a, int b);";
        let strategy = AssociationStrategy::ProximityWindow {
            source,
            node_start: source.find("int").unwrap(),
        };
        assert_eq!(strategy.docstring().as_deref(), Some("/** Adds */"));
    }

    #[test]
    fn test_strategy_line_fallback_uses_description() {
        let source = "/** One */\n\n/** Two */\n\n\nint x();\n";
        let blocks = CommentParser::new().extract(source, &CommentStyle::Block);

        let near = AssociationStrategy::LineProximity { blocks: &blocks, line: 6 };
        assert_eq!(near.docstring().as_deref(), Some("Two"));

        let far = AssociationStrategy::LineProximity { blocks: &blocks, line: 14 };
        assert_eq!(far.docstring(), None);
    }

    #[test]
    fn test_following_node_index() {
        let source = "namespace ns {\nclass Foo {\n  void bar() {}\n};\n}\nint top() { return 1; }\n";
        let tree = parse_cpp(source);
        let index = FollowingNodeIndex::new(&tree, source);

        assert_eq!(index.len(), 4);
        let first = index.nearest_after(0).unwrap();
        assert_eq!(first.kind(), "namespace_definition");

        let after_class = index.nearest_after(source.find("class").unwrap() + 1).unwrap();
        assert_eq!(after_class.kind(), "function_definition");
        assert_eq!(symbol_name(after_class, source), "bar");
        assert_eq!(scope_path(after_class, source), "ns::Foo");

        assert!(index.nearest_after(source.len()).is_none());
    }

    #[test]
    fn test_symbol_names() {
        let source = "struct Point { int x; };\nenum Color { Red };\nvoid Widget::draw() {}\n";
        let tree = parse_cpp(source);
        let index = FollowingNodeIndex::new(&tree, source);

        let names: Vec<String> = (0..3)
            .filter_map(|line| {
                let offset = source.lines().take(line).map(|l| l.len() + 1).sum();
                index.nearest_after(offset)
            })
            .map(|node| symbol_name(node, source))
            .collect();
        assert_eq!(names, vec!["Point", "Color", "Widget::draw"]);
    }
}
