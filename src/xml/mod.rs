//! Minimal owned XML tree
//!
//! Parsing is done with `quick-xml`; the tree keeps comments, whitespace and
//! the prolog so that directive comments can be found and an untouched
//! document is written back unchanged.
//!
//! Structural edits are made in two phases: traversals collect [`Mutation`]s
//! addressed by [`NodePath`], then [`apply_mutations`] performs them in
//! reverse document order so that no collected path is invalidated.

mod node;
mod parser;
mod writer;

pub use node::{Attribute, Document, Element, Node, NodePath};
pub use parser::{parse_document, parse_fragment};
pub use writer::{write_document, write_element, write_nodes};

/// Errors raised while reading XML
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    /// Syntax error reported by the reader
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { message: String, position: u64 },

    /// Input ended inside an element
    #[error("Unexpected end of input, expected closing tag </{0}>")]
    UnclosedElement(String),

    /// No root element
    #[error("Empty XML document: no root element found")]
    EmptyDocument,

    /// More than one top-level element
    #[error("Multiple root elements")]
    MultipleRoots,

    /// Non-whitespace text outside the root element
    #[error("Text content outside of the root element")]
    TextOutsideRoot,

    /// A prefix was used without a visible namespace declaration
    #[error("Undeclared namespace prefix '{0}'")]
    UndeclaredPrefix(String),
}

/// A structural edit collected during a traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Replace the node at `path` with `nodes`
    Replace { path: NodePath, nodes: Vec<Node> },
    /// Replace all children of the element at `path`
    ReplaceChildren { path: NodePath, nodes: Vec<Node> },
}

impl Mutation {
    fn path(&self) -> &[usize] {
        match self {
            Mutation::Replace { path, .. } | Mutation::ReplaceChildren { path, .. } => path,
        }
    }
}

/// Apply collected mutations below `root`, deepest and last first
///
/// Returns how many mutations found their target.
pub fn apply_mutations(root: &mut Element, mut mutations: Vec<Mutation>) -> usize {
    mutations.sort_by(|a, b| b.path().cmp(a.path()));

    let mut applied = 0;
    for mutation in mutations {
        match mutation {
            Mutation::Replace { path, nodes } => {
                let Some((index, parent_path)) = path.split_last() else {
                    continue;
                };
                let Some(parent) = root.element_at_mut(parent_path) else {
                    continue;
                };
                if *index < parent.children.len() {
                    let tail = parent.children.split_off(*index + 1);
                    parent.children.pop();
                    parent.children.extend(nodes);
                    parent.children.extend(tail);
                    applied += 1;
                }
            }
            Mutation::ReplaceChildren { path, nodes } => {
                if let Some(element) = root.element_at_mut(&path) {
                    element.children = nodes;
                    applied += 1;
                }
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_mutations_in_reverse_order() {
        let mut doc = parse_document("<r><!--a--><x><!--b--></x><!--c--></r>").unwrap();
        let mutations = vec![
            Mutation::Replace {
                path: vec![0],
                nodes: vec![
                    Node::Element(Element::new("a1")),
                    Node::Element(Element::new("a2")),
                ],
            },
            Mutation::Replace {
                path: vec![2],
                nodes: vec![Node::Element(Element::new("c"))],
            },
            Mutation::Replace {
                path: vec![1, 0],
                nodes: vec![Node::Element(Element::new("b"))],
            },
        ];

        assert_eq!(apply_mutations(&mut doc.root, mutations), 3);
        assert_eq!(
            write_document(&doc),
            "<r><a1 /><a2 /><x><b /></x><c /></r>"
        );
    }

    #[test]
    fn test_apply_replace_children() {
        let mut doc = parse_document("<r><x>old</x></r>").unwrap();
        let mutations = vec![Mutation::ReplaceChildren {
            path: vec![0],
            nodes: parse_fragment("<new/>", &[]).unwrap(),
        }];
        assert_eq!(apply_mutations(&mut doc.root, mutations), 1);
        assert_eq!(write_document(&doc), "<r><x><new /></x></r>");
    }

    #[test]
    fn test_apply_skips_stale_paths() {
        let mut doc = parse_document("<r/>").unwrap();
        let mutations = vec![Mutation::Replace {
            path: vec![4],
            nodes: Vec::new(),
        }];
        assert_eq!(apply_mutations(&mut doc.root, mutations), 0);
    }
}
