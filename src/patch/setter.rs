//! Value setters declared in directive comments
//!
//! `<!--{@attr=EXPR @a.b.attr=EXPR @=EXPR}-->` declares, in order, an
//! attribute setter, a scoped attribute setter and a text setter.

use super::expression::{Expression, ValueResolver, split_top_level};
use crate::xml::{Element, Node};

/// Setter result that deletes the target attribute
pub const REMOVE_VALUE: &str = "_REMOVE_";

/// A setter parsed from one directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setter {
    /// `@attr=EXPR` or `@a.b.attr=EXPR`
    Attribute {
        /// Local-name chain the target element must end with (`a.b`)
        element_names: Vec<String>,
        attribute: String,
        expression: Expression,
    },
    /// `@=EXPR`
    Text { expression: Expression },
}

impl Setter {
    /// Setters of a directive comment, `None` when the comment is not `{...}`
    pub fn parse_comment(comment: &str) -> Option<Vec<Setter>> {
        let comment = comment.trim();
        if comment.len() <= 2 || !comment.starts_with('{') || !comment.ends_with('}') {
            return None;
        }
        let body = &comment[1..comment.len() - 1];
        Some(
            split_top_level(body, char::is_whitespace)
                .into_iter()
                .filter_map(Setter::parse)
                .collect(),
        )
    }

    /// Parse one directive; anything that is not a setter gives `None`
    pub fn parse(directive: &str) -> Option<Self> {
        let directive = directive.strip_prefix('@')?;
        if let Some(expression) = directive.strip_prefix('=') {
            return Some(Setter::Text {
                expression: Expression::parse(expression),
            });
        }

        let (path, expression) = directive.split_once('=')?;
        if path.is_empty() {
            return None;
        }
        let mut element_names: Vec<String> = path.split('.').map(str::to_string).collect();
        let attribute = element_names.pop()?;
        Some(Setter::Attribute {
            element_names,
            attribute,
            expression: Expression::parse(expression),
        })
    }

    /// Apply to `element`; returns whether the element changed
    ///
    /// `ancestors` are the local names of the element's parents, outermost
    /// first. `is_inherited` is set for setters declared on an outer level:
    /// those only reach elements matching their element-name chain.
    pub fn apply(
        &self,
        element: &mut Element,
        ancestors: &[String],
        is_inherited: bool,
        resolver: &dyn ValueResolver,
    ) -> bool {
        match self {
            Setter::Attribute {
                element_names,
                attribute,
                expression,
            } => {
                if element_names.is_empty() && is_inherited {
                    return false;
                }
                if !chain_matches(element_names, element, ancestors) {
                    return false;
                }

                let current = element.attribute(attribute).unwrap_or_default();
                match expression.evaluate(current, resolver) {
                    None => false,
                    Some(value) if value == REMOVE_VALUE => element.remove_attribute(attribute),
                    Some(value) => {
                        let changed = element.attribute(attribute) != Some(value.as_str());
                        element.set_attribute(attribute.as_str(), value);
                        changed
                    }
                }
            }
            Setter::Text { expression } => {
                if is_inherited {
                    return false;
                }
                let index = text_node_index(element);
                let current = match index.and_then(|i| element.children.get(i)) {
                    Some(Node::Text(text) | Node::CData(text)) => text.as_str(),
                    _ => "",
                };
                let Some(value) = expression.evaluate(current, resolver) else {
                    return false;
                };
                let Some(Node::Text(text) | Node::CData(text)) = index.and_then(|i| element.children.get_mut(i)) else {
                    if value.is_empty() {
                        return false;
                    }
                    element.children.push(Node::Text(value));
                    return true;
                };

                let leading = &text[..text.len() - text.trim_start().len()];
                let trailing = &text[text.trim_end().len()..];
                let replaced = format!("{leading}{value}{trailing}");
                let changed = *text != replaced;
                *text = replaced;
                changed
            }
        }
    }
}

fn chain_matches(element_names: &[String], element: &Element, ancestors: &[String]) -> bool {
    let mut chain = std::iter::once(element.local_name()).chain(ancestors.iter().rev().map(String::as_str));
    element_names
        .iter()
        .rev()
        .all(|name| chain.next() == Some(name.as_str()))
}

/// Index of the text node a text setter writes to: the first non-blank one, else the first one
fn text_node_index(element: &Element) -> Option<usize> {
    let is_text = |node: &Node| matches!(node, Node::Text(_) | Node::CData(_));
    element
        .children
        .iter()
        .position(|node| match node {
            Node::Text(text) | Node::CData(text) => !text.trim().is_empty(),
            _ => false,
        })
        .or_else(|| element.children.iter().position(is_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Vars(HashMap<&'static str, &'static str>);

    impl ValueResolver for Vars {
        fn variable_value(&self, name: &str) -> Option<&str> {
            self.0.get(name).copied()
        }

        fn block_enabled(&self, _name: &str) -> Option<bool> {
            None
        }
    }

    fn vars(pairs: &[(&'static str, &'static str)]) -> Vars {
        Vars(pairs.iter().copied().collect())
    }

    #[test]
    fn test_parse_comment() {
        let setters = Setter::parse_comment(r#" {@port=PORT  @system.endpoint.address=$concat("http://", HOST) @=T ~BLOCK} "#).unwrap();
        assert_eq!(setters.len(), 3);
        assert!(matches!(&setters[0], Setter::Attribute { element_names, attribute, .. } if element_names.is_empty() && attribute == "port"));
        assert!(matches!(&setters[1], Setter::Attribute { element_names, attribute, .. } if element_names == &["system", "endpoint"] && attribute == "address"));
        assert!(matches!(&setters[2], Setter::Text { .. }));

        assert_eq!(Setter::parse_comment("plain comment"), None);
        assert_eq!(Setter::parse_comment("{}"), None);
        assert_eq!(Setter::parse_comment("{~GENERATED}"), Some(Vec::new()));
    }

    #[test]
    fn test_parse_rejects_non_setters() {
        assert_eq!(Setter::parse("~BLOCK"), None);
        assert_eq!(Setter::parse("@novalue"), None);
        assert_eq!(Setter::parse("@"), None);
    }

    #[test]
    fn test_attribute_setter_and_remove() {
        let resolver = vars(&[("PORT", "8080"), ("DROP", REMOVE_VALUE)]);
        let mut element = Element::new("server").with_attribute("port", "80").with_attribute("debug", "1");

        let setter = Setter::parse("@port=PORT").unwrap();
        assert!(setter.apply(&mut element, &[], false, &resolver));
        assert_eq!(element.attribute("port"), Some("8080"));

        let setter = Setter::parse("@debug=DROP").unwrap();
        assert!(setter.apply(&mut element, &[], false, &resolver));
        assert_eq!(element.attribute("debug"), None);
        // removing an absent attribute is a no-op
        assert!(!setter.apply(&mut element, &[], false, &resolver));

        let setter = Setter::parse("@port=Missing").unwrap();
        assert!(!setter.apply(&mut element, &[], false, &resolver));
        assert_eq!(element.attribute("port"), Some("8080"));
    }

    #[test]
    fn test_bare_attribute_setter_is_not_inherited() {
        let resolver = vars(&[("V", "x")]);
        let mut element = Element::new("add");
        let setter = Setter::parse("@key=V").unwrap();
        assert!(!setter.apply(&mut element, &["root".into()], true, &resolver));
        assert_eq!(element.attribute("key"), None);
    }

    #[test]
    fn test_scoped_attribute_setter_matches_chain() {
        let resolver = vars(&[("ADDR", "net.tcp://db")]);
        let setter = Setter::parse("@system.endpoint.address=ADDR").unwrap();
        let ancestors = vec!["configuration".to_string(), "system".to_string()];

        let mut endpoint = Element::new("endpoint");
        assert!(setter.apply(&mut endpoint, &ancestors, true, &resolver));
        assert_eq!(endpoint.attribute("address"), Some("net.tcp://db"));

        let mut other = Element::new("endpoint");
        assert!(!setter.apply(&mut other, &["client".to_string()], true, &resolver));

        let mut system = Element::new("system");
        assert!(!setter.apply(&mut system, &ancestors[..1], false, &resolver));
    }

    #[test]
    fn test_attribute_setter_sees_current_value() {
        let resolver = vars(&[("ENV", "prod")]);
        let mut element = Element::new("add").with_attribute("value", "app-dev.log");
        let setter = Setter::parse(r#"@value=$replace("dev", ENV)"#).unwrap();
        setter.apply(&mut element, &[], false, &resolver);
        assert_eq!(element.attribute("value"), Some("app-prod.log"));
    }

    #[test]
    fn test_text_setter_preserves_whitespace() {
        let resolver = vars(&[("T", "new")]);
        let mut element = Element::new("value")
            .with_child(Node::Text("\n    ".into()))
            .with_child(Node::Comment("c".into()))
            .with_child(Node::Text("\n   old  \n".into()));

        let setter = Setter::parse("@=T").unwrap();
        assert!(setter.apply(&mut element, &[], false, &resolver));
        assert_eq!(element.children[2], Node::Text("\n   new  \n".into()));
        assert_eq!(element.children[0], Node::Text("\n    ".into()));

        assert!(!setter.apply(&mut element, &[], true, &resolver));
    }

    #[test]
    fn test_text_setter_appends_text_node() {
        let resolver = vars(&[("T", "hello")]);
        let mut element = Element::new("value");
        Setter::parse("@=T").unwrap().apply(&mut element, &[], false, &resolver);
        assert_eq!(element.text(), "hello");
    }

    #[test]
    fn test_text_setter_without_value_leaves_element_alone() {
        let resolver = vars(&[]);
        let mut element = Element::new("value");
        assert!(!Setter::parse("@=MISSING").unwrap().apply(&mut element, &[], false, &resolver));
        assert!(element.children.is_empty());
    }
}
