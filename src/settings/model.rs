//! Settings entries
//!
//! Every entry remembers the file that declared it and the comments written
//! right before it, so that saving puts both back where they came from.

use std::path::{Path, PathBuf};

use crate::xml::{Element, Node, write_element};

/// Enabled flag of a block
///
/// `Unset` is neither enabled nor disabled: a block without an `enabled`
/// attribute only carries content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlockState {
    Enabled,
    Disabled,
    #[default]
    Unset,
}

impl BlockState {
    /// Parse the `enabled` attribute; anything but `true`/`false` (any case) is `Unset`
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("true") => BlockState::Enabled,
            Some(v) if v.eq_ignore_ascii_case("false") => BlockState::Disabled,
            _ => BlockState::Unset,
        }
    }

    pub fn from_bool(value: Option<bool>) -> Self {
        match value {
            Some(true) => BlockState::Enabled,
            Some(false) => BlockState::Disabled,
            None => BlockState::Unset,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            BlockState::Enabled => Some(true),
            BlockState::Disabled => Some(false),
            BlockState::Unset => None,
        }
    }

    /// Value written to the `enabled` attribute
    pub fn attribute_value(self) -> Option<&'static str> {
        self.as_bool().map(|b| if b { "true" } else { "false" })
    }
}

/// A `<var>` or `<meta>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: Option<String>,
    /// Settings file that declared the entry
    pub file: PathBuf,
    /// Comments preceding the entry in its file
    pub comments: Vec<String>,
}

/// Meta-variables share the variable shape but live in their own namespace
pub type MetaVariable = Variable;

/// A `<block>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub state: BlockState,
    /// Inner markup, `None` when the block has no content
    pub content: Option<String>,
    pub file: PathBuf,
    pub comments: Vec<String>,
}

impl Block {
    /// Content including the `<block>` element itself
    pub fn content_with_wrapper(&self) -> Option<String> {
        let content = self.content.as_ref()?;
        Some(write_element(&self.to_element(Some(content))))
    }

    /// Settings-file element for this block
    pub(crate) fn to_element(&self, content: Option<&String>) -> Element {
        let mut element = Element::new("block").with_attribute("name", &self.name);
        if let Some(enabled) = self.state.attribute_value() {
            element.set_attribute("enabled", enabled);
        }
        if let Some(content) = content.filter(|c| !c.is_empty()) {
            element.children.push(Node::Raw(content.clone()));
        }
        element
    }
}

/// An `<import>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// Path as written in the `from` attribute
    pub from: String,
    /// `from` resolved against the importing file's directory
    pub path: PathBuf,
    /// Settings file containing the `<import>`
    pub file: PathBuf,
    /// Set only on the synthesized entry for the root settings file
    pub is_root: bool,
    pub comments: Vec<String>,
}

impl ImportRef {
    /// Whether `name` designates this import: literal `from`, resolved path or file name
    pub fn matches(&self, name: &str) -> bool {
        self.from == name
            || self.path == Path::new(name)
            || self.path.file_name().is_some_and(|f| f == name)
    }
}

/// A comment that does not precede any entry of its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub text: String,
    pub file: PathBuf,
}

/// Where settings come from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingsLocation {
    /// A settings file; it does not have to exist yet
    File(PathBuf),
    /// No settings file could be located: an empty store that is never watched
    Unresolved,
}

impl SettingsLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            SettingsLocation::File(path) => Some(path),
            SettingsLocation::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SettingsLocation::File(_))
    }
}

impl From<PathBuf> for SettingsLocation {
    fn from(path: PathBuf) -> Self {
        SettingsLocation::File(path)
    }
}

impl From<&Path> for SettingsLocation {
    fn from(path: &Path) -> Self {
        SettingsLocation::File(path.to_path_buf())
    }
}
