//! Collapsing constructs that describe the same symbol.
//!
//! A C++ symbol is commonly declared in a header and defined in a source
//! file. Both sites are extracted as separate constructs with the same
//! `full_name`; merging folds them into one record that remembers every
//! location and every piece of documentation.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use super::construct::Construct;

/// What two sites of one symbol disagree on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    Docstring,
    ParameterCount { merged: usize, other: usize },
}

/// An advisory disagreement found while merging; never blocks the merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub full_name: String,
    pub kind: ConflictKind,
    /// `file:line` of the site that disagreed with the merged record
    pub location: String,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConflictKind::Docstring => {
                write!(f, "{}: differing documentation at {}", self.full_name, self.location)
            }
            ConflictKind::ParameterCount { merged, other } => write!(
                f,
                "{}: {} parameters at {}, {} elsewhere",
                self.full_name, other, self.location, merged
            ),
        }
    }
}

enum Slot {
    Unnamed(Construct),
    Group(Vec<Construct>),
}

/// Merge constructs sharing a `full_name`, in place
///
/// Groups keep the position of their first member. Constructs without a
/// `full_name` are left where they are. Returns the conflicts found; each is
/// also logged.
pub fn merge_duplicate_constructs(constructs: &mut Vec<Construct>) -> Vec<MergeConflict> {
    let mut slots: Vec<Slot> = Vec::with_capacity(constructs.len());
    let mut groups: HashMap<String, usize> = HashMap::new();

    for construct in constructs.drain(..) {
        if construct.full_name.is_empty() {
            slots.push(Slot::Unnamed(construct));
            continue;
        }

        match groups.get(&construct.full_name) {
            Some(&index) => {
                if let Slot::Group(members) = &mut slots[index] {
                    members.push(construct);
                }
            }
            None => {
                groups.insert(construct.full_name.clone(), slots.len());
                slots.push(Slot::Group(vec![construct]));
            }
        }
    }

    let mut conflicts = Vec::new();
    for slot in slots {
        match slot {
            Slot::Unnamed(construct) => constructs.push(construct),
            Slot::Group(members) => {
                let mut members = members.into_iter();
                let Some(first) = members.next() else {
                    continue;
                };
                let rest: Vec<Construct> = members.collect();
                if rest.is_empty() {
                    constructs.push(first);
                } else {
                    constructs.push(merge_group(first, rest, &mut conflicts));
                }
            }
        }
    }

    for conflict in &conflicts {
        warn!("Merge conflict for {}", conflict);
    }
    conflicts
}

fn merge_group(first: Construct, rest: Vec<Construct>, conflicts: &mut Vec<MergeConflict>) -> Construct {
    let mut merged = first.clone();
    merged.is_merged = true;
    merged.source_locations = Vec::new();
    merged.merged_docstrings = Vec::new();
    absorb(&mut merged, &first);

    for member in rest {
        detect_conflicts(&merged, &member, conflicts);
        if !merged.has_docstring() && member.has_docstring() {
            merged.docstring = member.docstring.clone();
        }
        absorb(&mut merged, &member);
    }

    merged.docstring = if merged.merged_docstrings.is_empty() {
        None
    } else {
        Some(merged.merged_docstrings.join("\n\n"))
    };
    merged
}

/// Add one member's locations and documentation to the merged record
fn absorb(merged: &mut Construct, member: &Construct) {
    if member.is_merged {
        merged.source_locations.extend(member.source_locations.iter().cloned());
        if !member.merged_docstrings.is_empty() {
            merged.merged_docstrings.extend(member.merged_docstrings.iter().cloned());
            return;
        }
    } else {
        merged.source_locations.push(member.location());
    }

    // Docs attached after the member was merged live only in `docstring`
    if let Some(doc) = member.docstring.as_deref().map(str::trim).filter(|doc| !doc.is_empty()) {
        merged.merged_docstrings.push(doc.to_string());
    }
}

fn detect_conflicts(merged: &Construct, member: &Construct, conflicts: &mut Vec<MergeConflict>) {
    let location = member.location();

    if let (Some(ours), Some(theirs)) = (merged.docstring.as_deref(), member.docstring.as_deref()) {
        let (ours, theirs) = (ours.trim(), theirs.trim());
        if !ours.is_empty() && !theirs.is_empty() && ours != theirs {
            conflicts.push(MergeConflict {
                full_name: merged.full_name.clone(),
                kind: ConflictKind::Docstring,
                location: location.clone(),
            });
        }
    }

    if merged.parameters.len() != member.parameters.len() {
        conflicts.push(MergeConflict {
            full_name: merged.full_name.clone(),
            kind: ConflictKind::ParameterCount {
                merged: merged.parameters.len(),
                other: member.parameters.len(),
            },
            location,
        });
    }
}
