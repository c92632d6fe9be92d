//! Reading and writing settings files
//!
//! Format:
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <settings>
//!   <import from="common/base.xml" />
//!   <meta name="FORCE_USE_APPDATA_PATH" value="false" />
//!   <var name="DB_HOST" value="localhost" />
//!   <block name="TENANTS" enabled="true">
//!     <tenant name="alpha" />
//!   </block>
//! </settings>
//! ```
//!
//! Comments are attached to the entry that follows them; comments after the
//! last entry are kept as freestanding comments of the file.

use std::path::{Path, PathBuf};

use super::model::{BlockState, CommentRecord, ImportRef, SettingsLocation};
use super::store::SettingsStore;
use crate::paths;
use crate::types::{Result, SettingsError};
use crate::xml::{Document, Element, Node, parse_document, write_document, write_nodes};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
const INDENT: &str = "\n  ";

impl SettingsStore {
    /// Load a root settings file and everything it imports
    ///
    /// A missing root file gives an empty store that still knows its root, so
    /// it can be filled and saved. [`SettingsLocation::Unresolved`] gives an
    /// empty store without a root.
    pub fn load(location: &SettingsLocation) -> Result<Self> {
        let mut store = Self::default();
        let SettingsLocation::File(path) = location else {
            tracing::debug!("No settings file located, using empty settings");
            return Ok(store);
        };

        let root = paths::absolute(path);
        store.root = Some(root.clone());
        store.imports.push(ImportRef {
            from: path.to_string_lossy().into_owned(),
            path: root.clone(),
            file: root.clone(),
            is_root: true,
            comments: Vec::new(),
        });
        store.note_file(&root);
        store.parse_source(&root, &mut Vec::new())?;
        store.note_ranked_file(&root);

        tracing::debug!(
            root = %root.display(),
            imports = store.all_imports().len(),
            variables = store.variables().len(),
            blocks = store.blocks().len(),
            "Settings loaded"
        );
        Ok(store)
    }

    /// Parse one settings file; imports are followed before the file's own entries
    ///
    /// `chain` holds the files currently being parsed, outermost first.
    pub(super) fn parse_source(&mut self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<()> {
        if chain.iter().any(|p| p == path) {
            return Err(SettingsError::ImportCycle {
                file: path.to_path_buf(),
            });
        }
        if self.parsed_files.contains(path) {
            return Ok(());
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Settings file not found, skipping: {}", path.display());
                return Ok(());
            }
            Err(e) => return Err(SettingsError::Io(e)),
        };
        let document = parse_document(&text).map_err(|e| SettingsError::parse(path, e))?;
        tracing::debug!("Parsing settings file: {}", path.display());

        self.parsed_files.insert(path.to_path_buf());
        self.note_file(path);
        chain.push(path.to_path_buf());

        let (entries, trailing) = attach_comments(&document.root);

        for (element, comments) in entries.iter().filter(|(e, _)| e.local_name() == "import") {
            let Some(from) = element.attribute("from").filter(|f| !f.is_empty()) else {
                continue;
            };
            let import_path = paths::resolve(paths::parent_dir(path), Path::new(from));
            if !self
                .imports
                .iter()
                .any(|i| !i.is_root && i.file == path && i.path == import_path)
            {
                self.imports.push(ImportRef {
                    from: from.to_string(),
                    path: import_path.clone(),
                    file: path.to_path_buf(),
                    is_root: false,
                    comments: comments.clone(),
                });
            }
            self.parse_source(&import_path, chain)?;
        }

        for (element, comments) in &entries {
            let Some(name) = element.attribute("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            match element.local_name() {
                "var" => self.add_or_update_variable(
                    path,
                    name,
                    element.attribute("value"),
                    comments.clone(),
                ),
                "meta" => self.add_or_update_meta_variable(
                    path,
                    name,
                    element.attribute("value"),
                    comments.clone(),
                ),
                "block" => {
                    let content = write_nodes(&element.children);
                    self.add_or_update_block(
                        path,
                        name,
                        BlockState::from_attribute(element.attribute("enabled")),
                        Some(&content),
                        comments.clone(),
                    );
                }
                _ => {}
            }
        }

        for text in trailing {
            self.comments.push(CommentRecord {
                text,
                file: path.to_path_buf(),
            });
        }

        chain.pop();
        self.note_ranked_file(path);
        Ok(())
    }

    /// Write every known settings file back
    ///
    /// Files that would be empty and do not exist yet are not created; all
    /// other files are overwritten so that removals are persisted.
    pub fn save(&self) -> Result<()> {
        if self.root.is_none() {
            return Err(SettingsError::config_error(
                "cannot save settings without a root settings file",
            ));
        }

        for file in &self.known_files {
            let document = self.file_document(file);
            if document.root.children.is_empty() && !file.exists() {
                continue;
            }

            if let Some(dir) = file.parent() {
                std::fs::create_dir_all(dir).map_err(|e| SettingsError::write(file, e))?;
            }
            std::fs::write(file, write_document(&document))
                .map_err(|e| SettingsError::write(file, e))?;
            tracing::debug!("Saved settings file: {}", file.display());
        }
        Ok(())
    }

    /// Settings document for one file, as [`Self::save`] would write it
    pub fn render_file(&self, file: impl AsRef<Path>) -> String {
        write_document(&self.file_document(&paths::absolute(file.as_ref())))
    }

    fn file_document(&self, file: &Path) -> Document {
        let mut root = Element::new("settings");

        for import in self.imports.iter().filter(|i| !i.is_root && i.file == file) {
            let element = Element::new("import").with_attribute("from", &import.from);
            push_entry(&mut root, &import.comments, element);
        }

        for meta in self.meta_variables().iter().filter(|m| m.file == file) {
            push_entry(&mut root, &meta.comments, variable_element("meta", &meta.name, meta.value.as_deref()));
        }

        let blocks: Vec<_> = self.blocks().iter().filter(|b| b.file == file).collect();
        for variable in self.variables().iter().filter(|v| v.file == file) {
            if blocks.iter().any(|b| b.name == variable.name) {
                continue;
            }
            push_entry(
                &mut root,
                &variable.comments,
                variable_element("var", &variable.name, variable.value.as_deref()),
            );
        }

        for block in blocks {
            push_entry(&mut root, &block.comments, block.to_element(block.content.as_ref()));
        }

        for comment in self.comments().iter().filter(|c| c.file == file) {
            root.children.push(Node::Text(INDENT.to_string()));
            root.children.push(Node::Comment(comment.text.clone()));
        }

        if !root.children.is_empty() {
            root.children.push(Node::Text("\n".to_string()));
        }

        Document {
            prolog: vec![
                Node::Raw(XML_DECLARATION.to_string()),
                Node::Text("\n".to_string()),
            ],
            root,
            epilog: Vec::new(),
        }
    }
}

fn variable_element(tag: &str, name: &str, value: Option<&str>) -> Element {
    let element = Element::new(tag).with_attribute("name", name);
    match value {
        Some(value) => element.with_attribute("value", value),
        None => element,
    }
}

fn push_entry(root: &mut Element, comments: &[String], element: Element) {
    for comment in comments {
        root.children.push(Node::Text(INDENT.to_string()));
        root.children.push(Node::Comment(comment.clone()));
    }
    root.children.push(Node::Text(INDENT.to_string()));
    root.children.push(Node::Element(element));
}

/// Pair each child element with the comments written before it
///
/// Comments before an element that is not an entry carry over to the next
/// one. Returns the pairs and the comments left after the last element.
fn attach_comments(root: &Element) -> (Vec<(&Element, Vec<String>)>, Vec<String>) {
    let mut entries = Vec::new();
    let mut pending = Vec::new();

    for node in &root.children {
        match node {
            Node::Comment(text) => pending.push(text.clone()),
            Node::Element(element) => {
                let is_entry = matches!(element.local_name(), "import" | "var" | "meta" | "block");
                if is_entry {
                    entries.push((element, std::mem::take(&mut pending)));
                }
            }
            _ => {}
        }
    }
    (entries, pending)
}
