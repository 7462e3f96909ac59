use tree_sitter::Tree;
use tracing::debug;

use super::association::{scope_path, symbol_name, FollowingNodeIndex};
use super::comments::CommentBlock;

/// Links parsed comment blocks to the construct node that follows each one
#[derive(Debug, Default, Clone)]
pub struct DocAssociator;

impl DocAssociator {
    pub fn new() -> Self {
        Self
    }

    /// Fill the symbol fields of every block that has a following construct
    ///
    /// Blocks with nothing after them keep empty symbol fields. `@class`,
    /// `@struct`, `@enum` and `@file` tags redirect a block to the named
    /// symbol regardless of what follows it.
    pub fn associate(&self, blocks: &mut [CommentBlock], tree: &Tree, source: &str) {
        let index = FollowingNodeIndex::new(tree, source);
        let mut associated = 0;

        for block in blocks.iter_mut() {
            if let Some(node) = index.nearest_after(block.end_offset) {
                block.namespace_path = scope_path(node, source);
                block.symbol_name = symbol_name(node, source);
                block.symbol_type = node.kind().to_string();
            }

            apply_overrides(block);
            if block.is_associated() {
                associated += 1;
            }
        }

        debug!(
            "Associated {} of {} comment blocks against {} constructs",
            associated,
            blocks.len(),
            index.len()
        );
    }
}

fn apply_overrides(block: &mut CommentBlock) {
    let redirect = [
        (&block.override_class, "class_specifier"),
        (&block.override_struct, "struct_specifier"),
        (&block.override_enum, "enum_specifier"),
        (&block.override_file, "file"),
    ]
    .into_iter()
    .find_map(|(name, kind)| name.clone().map(|name| (name, kind)));

    if let Some((name, kind)) = redirect {
        if kind == "file" {
            block.namespace_path.clear();
        }
        block.symbol_name = name;
        block.symbol_type = kind.to_string();
    }
}
