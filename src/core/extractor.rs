//! Construct extraction from C and C++ syntax trees.
//!
//! The walk is pre-order from the root. Namespaces, classes and structs extend
//! the scope path of their children; function definitions and declarations are
//! leaves and their children are never visited.

use std::collections::HashSet;

use tree_sitter::{Node, Tree};
use tracing::{debug, trace};

use super::association::AssociationStrategy;
use super::construct::{Construct, ConstructKind, Parameter};
use super::merge::{merge_duplicate_constructs, MergeConflict};
use super::naming::{declared_method_name, recover_function_name, QualifiedName, SCOPE_SEPARATOR};
use super::syntax::{
    children, declarator_sigils, find_child_by_kind, find_descendant_by_kind, function_declarator_of,
    has_child_kind, line_range, node_text,
};

/// Child kinds that can spell a return type
const TYPE_KINDS: [&str; 6] = [
    "primitive_type",
    "type_identifier",
    "qualified_identifier",
    "template_type",
    "sized_type_specifier",
    "placeholder_type_specifier",
];

const PARAMETER_KINDS: [&str; 3] = [
    "parameter_declaration",
    "optional_parameter_declaration",
    "variadic_parameter_declaration",
];

const BASE_CLASS_KINDS: [&str; 3] = ["type_identifier", "qualified_identifier", "template_type"];

/// Constructs of one tree, after merging repeated declarations
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub constructs: Vec<Construct>,
    /// Disagreements between declaration and definition in the same file
    pub conflicts: Vec<MergeConflict>,
}

/// Walks syntax trees and collects named constructs
#[derive(Debug, Default, Clone)]
pub struct AstExtractor;

impl AstExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every construct in `tree`, merging repeated declarations
    ///
    /// `source` must be the buffer `tree` was parsed from. The returned
    /// constructs hold no references into either.
    pub fn extract_constructs(&self, tree: &Tree, source: &str, filename: &str) -> Extraction {
        let mut walker = Walker {
            source,
            filename,
            constructs: Vec::new(),
            namespaces: HashSet::new(),
        };
        walker.walk(tree.root_node(), &Scope::default());

        let mut constructs = walker.constructs;
        debug!("Extracted {} constructs from {}", constructs.len(), filename);

        let conflicts = merge_duplicate_constructs(&mut constructs);
        Extraction { constructs, conflicts }
    }
}

/// Scope handed down the walk
#[derive(Debug, Clone, Default)]
struct Scope {
    path: String,
    /// Set while inside a class or struct body
    in_class: bool,
    access: String,
}

impl Scope {
    fn enter(&self, name: &str, in_class: bool, access: &str) -> Scope {
        let path = match (self.path.is_empty(), name.is_empty()) {
            (_, true) => self.path.clone(),
            (true, false) => name.to_string(),
            (false, false) => format!("{}{}{}", self.path, SCOPE_SEPARATOR, name),
        };
        Scope {
            path,
            in_class,
            access: access.to_string(),
        }
    }

    fn member_access(&self) -> String {
        if self.in_class {
            self.access.clone()
        } else {
            String::new()
        }
    }
}

struct Walker<'a> {
    source: &'a str,
    filename: &'a str,
    constructs: Vec<Construct>,
    /// Full paths of the namespaces opened so far
    namespaces: HashSet<String>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node, scope: &Scope) {
        match node.kind() {
            "function_definition" => {
                if self.is_deleted(node) {
                    trace!("Skipping deleted function at line {}", node.start_position().row + 1);
                    return;
                }
                self.extract_function(node, scope);
            }
            "function_declarator" => {
                if !is_function_pointer(node) {
                    self.extract_method_declaration(node, None, scope);
                }
            }
            "declaration" | "field_declaration" => match function_declarator_of(node) {
                // void (*callback)(int); declares a variable
                Some(declarator) if is_function_pointer(declarator) => {}
                Some(declarator) => {
                    if !self.is_deleted(node) {
                        self.extract_method_declaration(declarator, Some(node), scope);
                    }
                }
                None => self.walk_children(node, scope),
            },
            "friend_declaration" => {}
            "class_specifier" | "struct_specifier" => self.extract_record(node, scope),
            "enum_specifier" => {
                if node.child_by_field_name("body").is_some() {
                    let construct = self.simple_construct(node, ConstructKind::Enum, scope);
                    self.constructs.push(construct);
                }
                self.walk_children(node, scope);
            }
            "namespace_definition" => self.extract_namespace(node, scope),
            "field_declaration_list" => self.walk_members(node, scope),
            _ => self.walk_children(node, scope),
        }
    }

    fn walk_children(&mut self, node: Node, scope: &Scope) {
        for child in children(node) {
            self.walk(child, scope);
        }
    }

    /// Class body: access specifiers apply to the members that follow them
    fn walk_members(&mut self, body: Node, scope: &Scope) {
        let mut scope = scope.clone();
        for child in children(body) {
            if child.kind() == "access_specifier" {
                scope.access = node_text(child, self.source).trim().to_string();
                continue;
            }
            self.walk(child, &scope);
        }
    }

    fn extract_function(&mut self, node: Node, scope: &Scope) {
        let recovered = recover_function_name(node, self.source).unwrap_or_default();
        let declarator = function_declarator_of(node);
        self.push_callable(node, declarator, recovered, scope);
    }

    /// A callable declared but not defined here, e.g. a method in a header
    fn extract_method_declaration(&mut self, declarator: Node, declaration: Option<Node>, scope: &Scope) {
        let recovered = declared_method_name(declarator, self.source).unwrap_or_default();
        self.push_callable(declaration.unwrap_or(declarator), Some(declarator), recovered, scope);
    }

    fn push_callable(&mut self, node: Node, declarator: Option<Node>, recovered: String, scope: &Scope) {
        let split = QualifiedName::split(&recovered);
        let written_qualified = split.is_qualified();
        let qualified = split.within(&scope.path);

        // ns::helper() defined out of line is still a free function
        let qualified_by_namespace = written_qualified && self.namespaces.contains(&qualified.namespace_path);
        let member = scope.in_class || (written_qualified && !qualified_by_namespace);
        let kind = classify_callable(&qualified, member);
        if qualified.full_name.is_empty() {
            debug!(
                "Could not recover a name for the {} at {}:{}",
                kind,
                self.filename,
                node.start_position().row + 1
            );
        }

        let mut construct = Construct::new(kind, qualified.name, self.filename);
        construct.full_name = qualified.full_name;
        construct.namespace_path = qualified.namespace_path;
        construct.return_type = match kind {
            ConstructKind::Constructor | ConstructKind::Destructor => None,
            _ => Some(self.return_type(node)),
        };
        construct.parameters = declarator.map(|d| self.parameters(d)).unwrap_or_default();
        construct.is_static = self.has_specifier(node, "storage_class_specifier", "static");
        construct.is_virtual = has_child_kind(node, "virtual");
        construct.is_const = declarator.is_some_and(|d| self.has_specifier(d, "type_qualifier", "const"));
        construct.access_modifier = scope.member_access();
        self.finish(node, construct);
    }

    fn extract_record(&mut self, node: Node, scope: &Scope) {
        // `struct stat st;` names a type without defining it
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };

        let is_class = node.kind() == "class_specifier";
        let kind = if is_class { ConstructKind::Class } else { ConstructKind::Struct };

        let mut construct = self.simple_construct(node, kind, scope);
        construct.base_classes = find_child_by_kind(node, &["base_class_clause"])
            .map(|clause| {
                children(clause)
                    .filter(|child| BASE_CLASS_KINDS.contains(&child.kind()))
                    .map(|child| node_text(child, self.source))
                    .collect()
            })
            .unwrap_or_default();

        let inner = scope.enter(&construct.name, true, if is_class { "private" } else { "public" });
        self.constructs.push(construct);

        self.walk_members(body, &inner);
    }

    fn extract_namespace(&mut self, node: Node, scope: &Scope) {
        let name = node
            .child_by_field_name("name")
            .map(|name| node_text(name, self.source))
            .unwrap_or_default();

        if name.is_empty() {
            trace!("Anonymous namespace at line {}", node.start_position().row + 1);
        } else {
            let construct = self.simple_construct(node, ConstructKind::Namespace, scope);
            self.constructs.push(construct);
        }

        let inner = scope.enter(&name, false, "");
        if !name.is_empty() {
            self.namespaces.insert(inner.path.clone());
        }
        self.walk_children(node, &inner);
    }

    /// Name, qualified name, span and nearby comment of a scope-like node
    fn simple_construct(&self, node: Node, kind: ConstructKind, scope: &Scope) -> Construct {
        let mut name = node
            .child_by_field_name("name")
            .map(|name| node_text(name, self.source))
            .unwrap_or_default();

        // typedef struct { ... } Point;
        if name.is_empty() {
            if let Some(parent) = node.parent().filter(|p| p.kind() == "type_definition") {
                name = parent
                    .child_by_field_name("declarator")
                    .map(|d| node_text(d, self.source))
                    .unwrap_or_default();
            }
        }

        let qualified = QualifiedName {
            namespace_path: String::new(),
            name: name.clone(),
            full_name: name,
        }
        .within(&scope.path);

        let mut construct = Construct::new(kind, qualified.name, self.filename);
        construct.full_name = qualified.full_name;
        construct.namespace_path = qualified.namespace_path;
        construct.access_modifier = scope.member_access();

        let anchor = match node.parent() {
            Some(parent) if parent.kind() == "type_definition" => parent,
            _ => node,
        };
        let (start_line, end_line) = line_range(node);
        construct.start_line = start_line;
        construct.end_line = end_line;
        construct.docstring = AssociationStrategy::ProximityWindow {
            source: self.source,
            node_start: anchor.start_byte(),
        }
        .docstring();
        construct
    }

    fn finish(&mut self, node: Node, mut construct: Construct) {
        let (start_line, end_line) = line_range(node);
        construct.start_line = start_line;
        construct.end_line = end_line;
        construct.docstring = AssociationStrategy::ProximityWindow {
            source: self.source,
            node_start: node.start_byte(),
        }
        .docstring();

        trace!("Found {} {} at line {}", construct.kind, construct.full_name, start_line);
        self.constructs.push(construct);
    }

    fn is_deleted(&self, node: Node) -> bool {
        if has_child_kind(node, "delete_method_clause") {
            return true;
        }
        let text = node_text(node, self.source);
        text.contains("= delete") || text.contains("=delete")
    }

    fn has_specifier(&self, node: Node, kind: &str, text: &str) -> bool {
        children(node).any(|child| child.kind() == kind && node_text(child, self.source).trim() == text)
    }

    /// First type-looking child before the declarator, with its qualifiers and sigils
    fn return_type(&self, node: Node) -> String {
        let declarator = node.child_by_field_name("declarator");
        let mut qualifiers = Vec::new();

        for child in children(node) {
            if child.kind() == "function_declarator" || declarator.is_some_and(|d| d.id() == child.id()) {
                break;
            }
            match child.kind() {
                "type_qualifier" => qualifiers.push(node_text(child, self.source)),
                kind if TYPE_KINDS.contains(&kind) => {
                    qualifiers.push(node_text(child, self.source));
                    let sigils = declarator.map(|d| declarator_sigils(d, self.source)).unwrap_or_default();
                    return format!("{}{}", qualifiers.join(" "), sigils);
                }
                _ => {}
            }
        }

        "void".to_string()
    }

    fn parameters(&self, declarator: Node) -> Vec<Parameter> {
        let Some(list) = declarator.child_by_field_name("parameters") else {
            return Vec::new();
        };

        let parameters: Vec<Parameter> = children(list)
            .filter(|child| PARAMETER_KINDS.contains(&child.kind()))
            .map(|child| self.parameter(child))
            .collect();

        // f(void) takes nothing
        match parameters.as_slice() {
            [only] if only.param_type == "void" && only.name.is_empty() => Vec::new(),
            _ => parameters,
        }
    }

    fn parameter(&self, node: Node) -> Parameter {
        let mut param_type = children(node)
            .take_while(|child| Some(child.id()) != node.child_by_field_name("type").map(|t| t.id()))
            .filter(|child| child.kind() == "type_qualifier")
            .map(|child| node_text(child, self.source))
            .collect::<Vec<_>>();
        if let Some(ty) = node.child_by_field_name("type") {
            param_type.push(node_text(ty, self.source));
        }
        let mut param_type = param_type.join(" ");

        let declarator = node.child_by_field_name("declarator");
        let mut name = String::new();
        if let Some(declarator) = declarator {
            param_type.push_str(&declarator_sigils(declarator, self.source));
            name = if declarator.kind() == "identifier" {
                node_text(declarator, self.source)
            } else {
                find_descendant_by_kind(declarator, &["identifier"])
                    .map(|ident| node_text(ident, self.source))
                    .unwrap_or_default()
            };
        }

        if node.kind() == "variadic_parameter_declaration" {
            param_type.push_str("...");
        }

        Parameter {
            param_type,
            name,
            default_value: node
                .child_by_field_name("default_value")
                .map(|value| node_text(value, self.source)),
        }
    }
}

/// `(*name)(...)`: the declarator names a pointer, not a function
fn is_function_pointer(declarator: Node) -> bool {
    declarator
        .child_by_field_name("declarator")
        .is_some_and(|inner| inner.kind() == "parenthesized_declarator")
}

/// Function, method, constructor or destructor
fn classify_callable(name: &QualifiedName, member: bool) -> ConstructKind {
    if name.name.starts_with('~') {
        return ConstructKind::Destructor;
    }
    if !member {
        return ConstructKind::Function;
    }

    let owner = name.namespace_path.rsplit(SCOPE_SEPARATOR).next().unwrap_or("");
    if !owner.is_empty() && owner == name.name {
        ConstructKind::Constructor
    } else {
        ConstructKind::Method
    }
}
