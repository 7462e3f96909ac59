//! Small helpers over tree-sitter nodes shared by the extractor and associator.

use tree_sitter::Node;

/// Kinds that wrap a declarator without naming anything themselves
const DECLARATOR_WRAPPERS: [&str; 4] = [
    "pointer_declarator",
    "reference_declarator",
    "parenthesized_declarator",
    "attributed_declarator",
];

/// Source text covered by `node`
pub fn node_text(node: Node, source: &str) -> String {
    source.get(node.byte_range()).unwrap_or("").to_string()
}

/// 1-based first and last line of `node`
pub fn line_range(node: Node) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}

/// All direct children, anonymous tokens included
pub fn children<'tree>(node: Node<'tree>) -> impl Iterator<Item = Node<'tree>> {
    (0..node.child_count()).filter_map(move |i| node.child(i))
}

pub fn find_child_by_kind<'tree>(node: Node<'tree>, kinds: &[&str]) -> Option<Node<'tree>> {
    children(node).find(|child| kinds.contains(&child.kind()))
}

/// Pre-order search below `node` (excluding `node` itself)
pub fn find_descendant_by_kind<'tree>(node: Node<'tree>, kinds: &[&str]) -> Option<Node<'tree>> {
    for child in children(node) {
        if kinds.contains(&child.kind()) {
            return Some(child);
        }
        if let Some(found) = find_descendant_by_kind(child, kinds) {
            return Some(found);
        }
    }
    None
}

/// Follow the `declarator` field chain of a definition or declaration down to
/// its `function_declarator`, through pointer and reference wrappers
pub fn function_declarator_of(node: Node) -> Option<Node> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "function_declarator" => return Some(current),
            kind if DECLARATOR_WRAPPERS.contains(&kind) => {
                current = match current.child_by_field_name("declarator") {
                    Some(inner) => inner,
                    // reference_declarator carries its inner declarator unnamed
                    None => children(current).filter(|c| c.is_named()).last()?,
                };
            }
            _ => return None,
        }
    }
}

/// Pointer and reference sigils met while unwrapping `declarator`, outermost first
pub fn declarator_sigils(mut declarator: Node, source: &str) -> String {
    let mut sigils = String::new();
    loop {
        match declarator.kind() {
            "pointer_declarator" => sigils.push('*'),
            "reference_declarator" | "abstract_reference_declarator" => {
                match children(declarator).find(|c| !c.is_named()) {
                    Some(token) => sigils.push_str(&node_text(token, source)),
                    None => sigils.push('&'),
                }
            }
            "abstract_pointer_declarator" => sigils.push('*'),
            _ => return sigils,
        }
        declarator = match declarator
            .child_by_field_name("declarator")
            .or_else(|| children(declarator).filter(|c| c.is_named()).last())
        {
            Some(inner) => inner,
            None => return sigils,
        };
    }
}

/// Whether any direct child is the given token or node kind
pub fn has_child_kind(node: Node, kind: &str) -> bool {
    children(node).any(|child| child.kind() == kind)
}


#[cfg(test)]
mod tests {
    use super::test_support::parse_cpp;
    use super::*;

    #[test]
    fn test_function_declarator_through_reference() {
        let source = "JsonDoc& JsonDoc::operator=(JsonDoc&& other) noexcept { return *this; }";
        let tree = parse_cpp(source);
        let definition = tree.root_node().child(0).unwrap();
        assert_eq!(definition.kind(), "function_definition");

        let declarator = function_declarator_of(definition).unwrap();
        assert_eq!(declarator.kind(), "function_declarator");
        assert!(node_text(declarator, source).starts_with("JsonDoc::operator="));

        let outer = definition.child_by_field_name("declarator").unwrap();
        assert_eq!(declarator_sigils(outer, source), "&");
    }

    #[test]
    fn test_plain_declaration_has_no_function_declarator() {
        let source = "int counter = 0;";
        let tree = parse_cpp(source);
        let declaration = tree.root_node().child(0).unwrap();
        assert!(function_declarator_of(declaration).is_none());
        assert_eq!(line_range(declaration), (1, 1));
    }
}
