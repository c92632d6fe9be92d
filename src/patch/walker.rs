//! Depth-first walk applying directive setters
//!
//! Each element level has its own setter scope. A directive comment adds
//! setters to the scope of the level it appears on, a plain comment clears
//! that scope, and an element consumes it: after an element has been visited
//! the scope is cleared. Setters of outer levels stay active for the whole
//! subtree of the element they were declared before (see
//! [`Setter::apply`] for what an inherited setter may touch).

use super::expression::ValueResolver;
use super::setter::Setter;
use crate::xml::{Element, Node};

/// Applies the setters declared in comments of a document
pub struct SetterWalker<'a> {
    resolver: &'a dyn ValueResolver,
    /// Setter scopes, outermost first
    scopes: Vec<Vec<Setter>>,
    /// Local names of the elements enclosing the current level
    ancestors: Vec<String>,
    changes: usize,
}

impl std::fmt::Debug for SetterWalker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetterWalker")
            .field("scopes", &self.scopes)
            .field("ancestors", &self.ancestors)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl<'a> SetterWalker<'a> {
    pub fn new(resolver: &'a dyn ValueResolver) -> Self {
        Self {
            resolver,
            scopes: Vec::new(),
            ancestors: Vec::new(),
            changes: 0,
        }
    }

    /// Walk `root` and everything below it; returns how many values changed
    pub fn patch(root: &mut Element, resolver: &dyn ValueResolver) -> usize {
        let mut walker = SetterWalker::new(resolver);
        walker.visit_element(root);
        walker.changes
    }

    fn visit_element(&mut self, element: &mut Element) {
        self.apply_setters(element);

        self.scopes.push(Vec::new());
        self.ancestors.push(element.local_name().to_string());
        for node in &mut element.children {
            match node {
                Node::Comment(text) => self.visit_comment(text),
                Node::Element(child) => {
                    self.visit_element(child);
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.clear();
                    }
                }
                _ => {}
            }
        }
        self.ancestors.pop();
        self.scopes.pop();
    }

    fn visit_comment(&mut self, comment: &str) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        match Setter::parse_comment(comment) {
            Some(setters) => scope.extend(setters),
            None => scope.clear(),
        }
    }

    fn apply_setters(&mut self, element: &mut Element) {
        let innermost = self.scopes.len().saturating_sub(1);
        for (level, scope) in self.scopes.iter().enumerate() {
            for setter in scope {
                if setter.apply(element, &self.ancestors, level < innermost, self.resolver) {
                    self.changes += 1;
                }
            }
        }
    }
}
