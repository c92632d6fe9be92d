//! Deterministic XML serialization
//!
//! Empty elements are written as `<name />`, attribute values are always
//! double-quoted, everything else (whitespace included) is written as stored.

use quick_xml::escape::{escape, partial_escape};

use super::{Document, Element, Node};

/// Serialize a whole document
pub fn write_document(document: &Document) -> String {
    let mut out = String::new();
    for node in &document.prolog {
        write_node(&mut out, node);
    }
    write_element_into(&mut out, &document.root);
    for node in &document.epilog {
        write_node(&mut out, node);
    }
    out
}

/// Serialize a single element with its subtree
pub fn write_element(element: &Element) -> String {
    let mut out = String::new();
    write_element_into(&mut out, element);
    out
}

/// Serialize a sequence of sibling nodes
pub fn write_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(element) => write_element_into(out, element),
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Node::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Node::Raw(raw) => out.push_str(raw),
    }
}

fn write_element_into(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for attribute in &element.attributes {
        out.push(' ');
        out.push_str(&attribute.name);
        out.push_str("=\"");
        out.push_str(&escape(attribute.value.as_str()));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str(" />");
        return;
    }

    out.push('>');
    for child in &element.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_is_stable_for_normalized_input() {
        let source = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<configuration>\n  <!--{@value=A}-->\n  <add key=\"k\" value=\"v\" />\n  <text>a &amp; b</text>\n</configuration>";
        let doc = parse_document(source).unwrap();
        assert_eq!(write_document(&doc), source);
    }

    #[test]
    fn test_write_normalizes_quotes_and_empty_elements() {
        let doc = parse_document("<node a='old'><x></x></node>").unwrap();
        assert_eq!(write_document(&doc), r#"<node a="old"><x /></node>"#);
    }

    #[test]
    fn test_write_escapes_attribute_values() {
        let element = Element::new("var").with_attribute("value", r#"<"a" & 'b'>"#);
        assert_eq!(
            write_element(&element),
            r#"<var value="&lt;&quot;a&quot; &amp; &apos;b&apos;&gt;" />"#
        );
    }

    #[test]
    fn test_write_cdata_and_comment_verbatim() {
        let source = "<r><![CDATA[a < b]]><!-- {~B} --></r>";
        let doc = parse_document(source).unwrap();
        assert_eq!(write_document(&doc), source);
    }
}
