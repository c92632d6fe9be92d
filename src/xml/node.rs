//! Owned XML node types

/// Index path from the root element down to a node: one child index per level
pub type NodePath = Vec<usize>;

/// An attribute with its qualified name as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Declared prefix if this is a namespace declaration (`""` for the default namespace)
    pub fn namespace_prefix(&self) -> Option<&str> {
        if self.name == "xmlns" {
            Some("")
        } else {
            self.name.strip_prefix("xmlns:")
        }
    }
}

/// A node of the tree
///
/// Text is stored unescaped; `Raw` holds markup that is written back verbatim
/// (XML declaration, processing instructions, DOCTYPE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    Raw(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Node::Element(_))
    }
}

/// An element with its qualified name, attributes in document order and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style child appender
    pub fn with_child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    /// Name without the namespace prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing the value in place when it already exists
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    /// Remove an attribute; returns whether it was present
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| a.name != name);
        self.attributes.len() != before
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// First child element with the given local name
    pub fn element(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    /// Concatenated text and CDATA content of the direct children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Namespace declarations made on this element as `(prefix, uri)` pairs
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter_map(|a| a.namespace_prefix().map(|p| (p, a.value.as_str())))
    }

    /// Element at `path` below this element; an empty path is `self`
    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for index in path {
            current = current.children.get(*index)?.as_element()?;
        }
        Some(current)
    }

    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for index in path {
            current = current.children.get_mut(*index)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Namespace declarations visible at the element at `path`, innermost first
    ///
    /// A prefix declared on several levels appears once, with the innermost binding.
    pub fn namespaces_in_scope(&self, path: &[usize]) -> Vec<(String, String)> {
        let mut chain = vec![self];
        let mut current = self;
        for index in path {
            match current.children.get(*index).and_then(Node::as_element) {
                Some(child) => {
                    chain.push(child);
                    current = child;
                }
                None => break,
            }
        }

        let mut scope: Vec<(String, String)> = Vec::new();
        for element in chain.iter().rev() {
            for (prefix, uri) in element.namespace_declarations() {
                if !scope.iter().any(|(p, _)| p == prefix) {
                    scope.push((prefix.to_string(), uri.to_string()));
                }
            }
        }
        scope
    }
}

/// A parsed document: whatever precedes the root, the root element, whatever follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Every comment of the document, in document order
    pub fn comments(&self) -> Vec<&str> {
        fn collect<'a>(nodes: &'a [Node], out: &mut Vec<&'a str>) {
            for node in nodes {
                match node {
                    Node::Comment(text) => out.push(text),
                    Node::Element(element) => collect(&element.children, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.prolog, &mut out);
        collect(&self.root.children, &mut out);
        collect(&self.epilog, &mut out);
        out
    }
}
