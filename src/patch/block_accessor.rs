//! Conditional blocks
//!
//! A marker comment `<!--{~NAME}-->` (or `<!--{~!NAME}-->`) controls what
//! follows it:
//! - enabled: the next plain comment holds markup and is uncommented
//! - disabled: the next element is commented out
//! - the block has content: the next element's children are replaced by it
//!
//! The passes run in that order over the whole document. Each pass collects
//! [`Mutation`]s first and applies them when the traversal is done.

use crate::settings::SettingsStore;
use crate::xml::{Element, Mutation, Node, NodePath, apply_mutations, parse_fragment, write_element};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Enable,
    Disable,
    Content,
}

/// Block name of a marker comment, `None` for any other comment
pub fn marker_name(comment: &str) -> Option<&str> {
    let comment = comment.trim();
    if comment.len() > 3 && comment.starts_with("{~") && comment.ends_with('}') {
        Some(&comment[2..comment.len() - 1])
    } else {
        None
    }
}

/// Applies block markers of a document against a settings store
#[derive(Debug)]
pub struct BlockAccessor<'a> {
    store: &'a SettingsStore,
}

impl<'a> BlockAccessor<'a> {
    pub fn new(store: &'a SettingsStore) -> Self {
        Self { store }
    }

    /// Run all passes below `root`; returns how many nodes were changed
    pub fn apply(&self, root: &mut Element) -> usize {
        let mut changes = 0;
        for pass in [Pass::Enable, Pass::Disable, Pass::Content] {
            if pass == Pass::Content && !self.store.has_content_blocks() {
                continue;
            }
            let mut mutations = Vec::new();
            self.collect(pass, root, root, &mut Vec::new(), &mut mutations);
            let applied = apply_mutations(root, mutations);
            tracing::debug!(?pass, applied, "Block pass finished");
            changes += applied;
        }
        changes
    }

    fn collect(
        &self,
        pass: Pass,
        root: &Element,
        element: &Element,
        path: &mut NodePath,
        out: &mut Vec<Mutation>,
    ) {
        let mut pending = false;
        let mut content: Option<&str> = None;

        for (index, node) in element.children.iter().enumerate() {
            match node {
                Node::Comment(comment) => match (pass, marker_name(comment)) {
                    (Pass::Enable, Some(name)) => pending |= self.is_enabled(name),
                    (Pass::Disable, Some(name)) => pending |= self.is_disabled(name),
                    (Pass::Content, Some(name)) => content = self.store.block_content(name),
                    (Pass::Enable, None) => {
                        if pending {
                            pending = false;
                            let namespaces = root.namespaces_in_scope(path);
                            match parse_fragment(comment.trim(), &namespaces) {
                                Ok(nodes) if nodes.iter().any(Node::is_element) => out.push(Mutation::Replace {
                                    path: child_path(path, index),
                                    nodes,
                                }),
                                Ok(_) => tracing::warn!("Cannot enable block, comment holds no markup: {}", comment.trim()),
                                Err(e) => tracing::warn!("Cannot enable block, invalid markup in comment: {}", e),
                            }
                        }
                    }
                    (Pass::Disable, None) => pending = false,
                    (Pass::Content, None) => content = None,
                },
                Node::Element(child) => {
                    path.push(index);
                    let handled = match pass {
                        Pass::Enable => {
                            pending = false;
                            false
                        }
                        Pass::Disable if pending => {
                            pending = false;
                            self.disable(child, path, out)
                        }
                        Pass::Disable => false,
                        Pass::Content => match content.take().filter(|c| !c.is_empty()) {
                            Some(markup) => self.replace_content(root, markup, path, out),
                            None => false,
                        },
                    };
                    if !handled {
                        self.collect(pass, root, child, path, out);
                    }
                    path.pop();
                }
                _ => {}
            }
        }
    }

    fn disable(&self, element: &Element, path: &NodePath, out: &mut Vec<Mutation>) -> bool {
        let markup = write_element(element);
        if markup.contains("--") {
            tracing::warn!("Cannot disable <{}>: its markup cannot be put in a comment", element.name);
            return false;
        }
        out.push(Mutation::Replace {
            path: path.clone(),
            nodes: vec![Node::Comment(markup)],
        });
        true
    }

    fn replace_content(&self, root: &Element, markup: &str, path: &NodePath, out: &mut Vec<Mutation>) -> bool {
        let namespaces = root.namespaces_in_scope(path);
        match parse_fragment(markup, &namespaces) {
            Ok(nodes) => {
                out.push(Mutation::ReplaceChildren {
                    path: path.clone(),
                    nodes,
                });
                true
            }
            Err(e) => {
                tracing::warn!("Cannot set block content, invalid markup: {}", e);
                false
            }
        }
    }

    fn is_enabled(&self, name: &str) -> bool {
        match name.strip_prefix('!') {
            Some(name) => !self.store.is_block_enabled(name),
            None => self.store.is_block_enabled(name),
        }
    }

    fn is_disabled(&self, name: &str) -> bool {
        match name.strip_prefix('!') {
            Some(name) => !self.store.is_block_disabled(name),
            None => self.store.is_block_disabled(name),
        }
    }
}

fn child_path(path: &NodePath, index: usize) -> NodePath {
    let mut child = path.clone();
    child.push(index);
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{BlockState, SettingsLocation};
    use crate::xml::{parse_document, write_document};
    use pretty_assertions::assert_eq;

    const SETTINGS: &str = "/cfg/_ConfigSettings.xml";

    fn store(blocks: &[(&str, BlockState, Option<&str>)]) -> SettingsStore {
        let mut store = SettingsStore::load(&SettingsLocation::Unresolved).unwrap();
        for (name, state, content) in blocks {
            store.add_or_update_block(SETTINGS, name, *state, *content, Vec::new());
        }
        store
    }

    fn apply(source: &str, store: &SettingsStore) -> String {
        let mut document = parse_document(source).unwrap();
        BlockAccessor::new(store).apply(&mut document.root);
        write_document(&document)
    }

    #[test]
    fn test_marker_name() {
        assert_eq!(marker_name(" {~FEATURE} "), Some("FEATURE"));
        assert_eq!(marker_name("{~!FEATURE}"), Some("!FEATURE"));
        assert_eq!(marker_name("{~}"), None);
        assert_eq!(marker_name("{@a=B}"), None);
    }

    #[test]
    fn test_enabled_block_is_uncommented() {
        let store = store(&[("FEATURE", BlockState::Enabled, None)]);
        let result = apply(
            "<root>\n  <!--{~FEATURE}-->\n  <!-- <feature mode=\"on\" /> -->\n</root>",
            &store,
        );
        assert_eq!(
            result,
            "<root>\n  <!--{~FEATURE}-->\n  <feature mode=\"on\" />\n</root>"
        );
    }

    #[test]
    fn test_element_between_cancels_enable() {
        let store = store(&[("FEATURE", BlockState::Enabled, None)]);
        let source = "<root><!--{~FEATURE}--><other /><!--<feature />--></root>";
        assert_eq!(apply(source, &store), source);
    }

    #[test]
    fn test_disabled_block_is_commented_out() {
        let store = store(&[("FEATURE", BlockState::Disabled, None)]);
        let result = apply(
            "<root><!--{~FEATURE}--><feature mode=\"on\"><x /></feature><kept /></root>",
            &store,
        );
        assert_eq!(
            result,
            "<root><!--{~FEATURE}--><!--<feature mode=\"on\"><x /></feature>--><kept /></root>"
        );
    }

    #[test]
    fn test_plain_comment_between_cancels_disable() {
        let store = store(&[("FEATURE", BlockState::Disabled, None)]);
        let source = "<root><!--{~FEATURE}--><!-- note --><feature /></root>";
        assert_eq!(apply(source, &store), source);
    }

    #[test]
    fn test_negated_marker() {
        let store = store(&[("LEGACY", BlockState::Disabled, None)]);
        let result = apply("<root><!--{~!LEGACY}--><!--<modern />--></root>", &store);
        assert_eq!(result, "<root><!--{~!LEGACY}--><modern /></root>");

        let result = apply("<root><!--{~!LEGACY}--><modern /></root>", &store);
        assert_eq!(result, "<root><!--{~!LEGACY}--><modern /></root>");
    }

    #[test]
    fn test_unset_block_changes_nothing() {
        let store = store(&[("FEATURE", BlockState::Unset, None)]);
        let source = "<root><!--{~FEATURE}--><!--<a />--><!--{~FEATURE}--><b /></root>";
        assert_eq!(apply(source, &store), source);
    }

    #[test]
    fn test_conditional_marker_expression() {
        let mut store = store(&[]);
        store.add_or_update_variable(SETTINGS, "DB", Some("postgres"), Vec::new());
        let result = apply(
            r#"<root><!--{~$equals(DB,"postgres")}--><!--<pg />--><!--{~$equals(DB,"mssql")}--><!--<mssql />--></root>"#,
            &store,
        );
        assert_eq!(
            result,
            r#"<root><!--{~$equals(DB,"postgres")}--><pg /><!--{~$equals(DB,"mssql")}--><!--<mssql />--></root>"#
        );
    }

    #[test]
    fn test_block_content_replaces_children() {
        let store = store(&[("TENANTS", BlockState::Unset, Some("<tenant name=\"alpha\" />"))]);
        let result = apply(
            "<root><!--{~TENANTS}--><tenants><tenant name=\"default\" /></tenants></root>",
            &store,
        );
        assert_eq!(
            result,
            "<root><!--{~TENANTS}--><tenants><tenant name=\"alpha\" /></tenants></root>"
        );
    }

    #[test]
    fn test_nested_markers() {
        let store = store(&[
            ("OUTER", BlockState::Enabled, None),
            ("INNER", BlockState::Disabled, None),
        ]);
        let result = apply(
            "<root><section><!--{~INNER}--><inner /></section><!--{~OUTER}--><!--<outer />--></root>",
            &store,
        );
        assert_eq!(
            result,
            "<root><section><!--{~INNER}--><!--<inner />--></section><!--{~OUTER}--><outer /></root>"
        );
    }

    #[test]
    fn test_uncommented_markup_sees_parent_namespaces() {
        let store = store(&[("EXT", BlockState::Enabled, None)]);
        let result = apply(
            r#"<root xmlns:ext="urn:ext"><items><!--{~EXT}--><!--<ext:item />--></items></root>"#,
            &store,
        );
        assert_eq!(
            result,
            r#"<root xmlns:ext="urn:ext"><items><!--{~EXT}--><ext:item /></items></root>"#
        );
    }

    #[test]
    fn test_invalid_markup_is_left_alone() {
        let store = store(&[("EXT", BlockState::Enabled, None)]);
        let source = "<root><!--{~EXT}--><!--<undeclared:item />--><!--{~EXT}--><!-- not <markup --><!--{~EXT}--><!-- just text --></root>";
        assert_eq!(apply(source, &store), source);
    }
}
