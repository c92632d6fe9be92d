//! XML parser building the owned tree
//!
//! Whitespace, comments and the prolog are kept so that writing an unmodified
//! document reproduces it.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{Attribute, Document, Element, Node, XmlError};

/// Name of the synthetic element wrapping fragments during parsing
const FRAGMENT_WRAPPER: &str = "config-settings-fragment";

/// Parse a complete document
pub fn parse_document(source: &str) -> Result<Document, XmlError> {
    DocumentParser::new(source).parse()
}

/// Parse a markup fragment in the context of the given namespace declarations
///
/// `namespaces` are `(prefix, uri)` pairs (`""` for the default namespace),
/// innermost first, as returned by [`Element::namespaces_in_scope`]. Every
/// prefix used by the fragment must be declared either there or inside the
/// fragment itself.
pub fn parse_fragment(markup: &str, namespaces: &[(String, String)]) -> Result<Vec<Node>, XmlError> {
    let mut wrapper = format!("<{FRAGMENT_WRAPPER}");
    for (prefix, uri) in namespaces {
        let escaped = quick_xml::escape::escape(uri.as_str());
        if prefix.is_empty() {
            wrapper.push_str(&format!(" xmlns=\"{escaped}\""));
        } else {
            wrapper.push_str(&format!(" xmlns:{prefix}=\"{escaped}\""));
        }
    }
    wrapper.push('>');
    wrapper.push_str(markup);
    wrapper.push_str(&format!("</{FRAGMENT_WRAPPER}>"));

    let document = parse_document(&wrapper)?;
    let declared: Vec<&str> = namespaces.iter().map(|(p, _)| p.as_str()).collect();
    for element in document.root.elements() {
        check_prefixes(element, &declared)?;
    }
    Ok(document.root.children)
}

fn check_prefixes(element: &Element, declared: &[&str]) -> Result<(), XmlError> {
    let mut scope: Vec<&str> = declared.to_vec();
    scope.extend(element.namespace_declarations().map(|(prefix, _)| prefix));

    let is_declared = |prefix: &str| matches!(prefix, "xml" | "xmlns") || scope.contains(&prefix);

    if let Some(prefix) = element.prefix() {
        if !is_declared(prefix) {
            return Err(XmlError::UndeclaredPrefix(prefix.to_string()));
        }
    }
    for attribute in &element.attributes {
        if let Some((prefix, _)) = attribute.name.split_once(':') {
            if !is_declared(prefix) {
                return Err(XmlError::UndeclaredPrefix(prefix.to_string()));
            }
        }
    }
    for child in element.elements() {
        check_prefixes(child, &scope)?;
    }
    Ok(())
}

/// Internal parser state.
struct DocumentParser<'a> {
    source: &'a str,
    reader: Reader<&'a [u8]>,
    /// Elements opened but not yet closed
    stack: Vec<Element>,
}

impl<'a> DocumentParser<'a> {
    fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        Self {
            source,
            reader,
            stack: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Document, XmlError> {
        let mut prolog = Vec::new();
        let mut root: Option<Element> = None;
        let mut epilog = Vec::new();

        loop {
            let event_start = self.reader.buffer_position();

            let node = match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = self.element_from(&e)?;
                    self.stack.push(element);
                    continue;
                }
                Ok(Event::End(_)) => {
                    // quick-xml already verified the end tag matches the open one
                    let element = self.stack.pop().ok_or_else(|| XmlError::Syntax {
                        message: "unexpected closing tag".to_string(),
                        position: event_start,
                    })?;
                    Node::Element(element)
                }
                Ok(Event::Empty(e)) => Node::Element(self.element_from(&e)?),
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| XmlError::Syntax {
                        message: format!("invalid text content: {err}"),
                        position: event_start,
                    })?;
                    Node::Text(text.into_owned())
                }
                Ok(Event::CData(e)) => Node::CData(String::from_utf8_lossy(&e).into_owned()),
                Ok(Event::Comment(e)) => Node::Comment(String::from_utf8_lossy(&e).into_owned()),
                Ok(Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => {
                    let end = self.reader.buffer_position();
                    Node::Raw(self.raw_markup(event_start, end)?.to_string())
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    return Err(XmlError::Syntax {
                        message: err.to_string(),
                        position: self.reader.error_position(),
                    });
                }
            };

            if let Some(parent) = self.stack.last_mut() {
                parent.children.push(node);
                continue;
            }

            match node {
                Node::Element(element) => {
                    if root.is_some() {
                        return Err(XmlError::MultipleRoots);
                    }
                    root = Some(element);
                }
                Node::Text(text) if !text.trim().is_empty() => {
                    return Err(XmlError::TextOutsideRoot);
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(open) = self.stack.last() {
            return Err(XmlError::UnclosedElement(open.name.clone()));
        }

        let root = root.ok_or(XmlError::EmptyDocument)?;
        Ok(Document {
            prolog,
            root,
            epilog,
        })
    }

    /// Source text between two reader positions
    fn raw_markup(&self, start: u64, end: u64) -> Result<&str, XmlError> {
        usize::try_from(start)
            .ok()
            .zip(usize::try_from(end).ok())
            .and_then(|(start, end)| self.source.get(start..end))
            .ok_or_else(|| XmlError::Syntax {
                message: "markup position outside the input".to_string(),
                position: start,
            })
    }

    fn element_from(&self, start: &BytesStart<'_>) -> Result<Element, XmlError> {
        let position = self.reader.buffer_position();
        let syntax = |message: String| XmlError::Syntax { message, position };

        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| syntax(format!("invalid attribute: {err}")))?;
            let value = attr
                .unescape_value()
                .map_err(|err| syntax(format!("invalid attribute value: {err}")))?;
            attributes.push(Attribute {
                name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value: value.into_owned(),
            });
        }

        Ok(Element {
            name,
            attributes,
            children: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_document() {
        let doc = parse_document(r#"<root a="1"><child/>text</root>"#).unwrap();
        assert_eq!(doc.root.name, "root");
        assert_eq!(doc.root.attribute("a"), Some("1"));
        assert_eq!(doc.root.children.len(), 2);
        assert_eq!(doc.root.text(), "text");
    }

    #[test]
    fn test_parse_keeps_prolog_whitespace_and_comments() {
        let source = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!-- head -->\n<root>\n  <!--{@a=B}-->\n  <x />\n</root>\n";
        let doc = parse_document(source).unwrap();

        assert_eq!(
            doc.prolog,
            vec![
                Node::Raw("<?xml version=\"1.0\" encoding=\"utf-8\"?>".into()),
                Node::Text("\n".into()),
                Node::Comment(" head ".into()),
                Node::Text("\n".into()),
            ]
        );
        assert_eq!(doc.root.children[1], Node::Comment("{@a=B}".into()));
        assert_eq!(doc.epilog, vec![Node::Text("\n".into())]);
    }

    #[test]
    fn test_parse_keeps_raw_markup_after_multibyte_text() {
        let source = "<!-- héllo wörld -->\n<?xml-stylesheet href=\"a.xsl\"?>\n<!DOCTYPE root>\n<root />";
        let doc = parse_document(source).unwrap();

        let raw: Vec<&Node> = doc.prolog.iter().filter(|n| matches!(n, Node::Raw(_))).collect();
        assert_eq!(
            raw,
            vec![
                &Node::Raw("<?xml-stylesheet href=\"a.xsl\"?>".into()),
                &Node::Raw("<!DOCTYPE root>".into()),
            ]
        );
    }

    #[test]
    fn test_parse_unescapes_text_and_attributes() {
        let doc = parse_document(r#"<r v="a &amp; &quot;b&quot;">1 &lt; 2</r>"#).unwrap();
        assert_eq!(doc.root.attribute("v"), Some(r#"a & "b""#));
        assert_eq!(doc.root.text(), "1 < 2");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_document("<a><b></a>"),
            Err(XmlError::Syntax { .. })
        ));
        assert!(matches!(
            parse_document("<a>"),
            Err(XmlError::UnclosedElement(_) | XmlError::Syntax { .. })
        ));
        assert_eq!(parse_document("<!-- only -->"), Err(XmlError::EmptyDocument));
        assert_eq!(parse_document("<a/><b/>"), Err(XmlError::MultipleRoots));
        assert_eq!(parse_document("<a/>junk"), Err(XmlError::TextOutsideRoot));
    }

    #[test]
    fn test_parse_fragment_multiple_nodes() {
        let nodes = parse_fragment("<a/> <b>t</b>", &[]).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].as_element().map(|e| e.name.as_str()), Some("a"));
        assert_eq!(nodes[2].as_element().map(Element::text), Some("t".to_string()));
    }

    #[test]
    fn test_parse_fragment_resolves_inherited_prefix() {
        let scope = vec![("n".to_string(), "urn:n".to_string())];
        let nodes = parse_fragment(r#"<n:target n:name="f" />"#, &scope).unwrap();
        let element = nodes[0].as_element().unwrap();
        assert_eq!(element.name, "n:target");
        // The wrapper's declarations stay out of the parsed nodes
        assert!(element.attribute("xmlns:n").is_none());
    }

    #[test]
    fn test_parse_fragment_rejects_undeclared_prefix() {
        assert_eq!(
            parse_fragment("<n:target />", &[]),
            Err(XmlError::UndeclaredPrefix("n".into()))
        );
        // Declared locally is fine
        assert!(parse_fragment(r#"<n:target xmlns:n="urn:n"><n:x/></n:target>"#, &[]).is_ok());
    }
}
