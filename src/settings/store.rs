//! Settings store
//!
//! Holds the variables, meta-variables, blocks, imports and comments of a root
//! settings file and everything it imports.
//!
//! ## Override rules
//!
//! Several files may declare the same name. The effective entry is the one
//! from the file that finished parsing last (imports finish before the file
//! importing them), and within one file the one declared last. A file's own
//! declarations therefore always beat those of its imports, wherever the
//! `<import>` element is written.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::model::{Block, BlockState, CommentRecord, ImportRef, MetaVariable, Variable};
use crate::patch::expression::{self, ValueResolver, bool_str, is_false, is_true};
use crate::paths;
use crate::types::{Result, SettingsError};
use crate::xml::{parse_document, write_nodes};

/// Parsed settings of a root file and its imports
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    pub(super) root: Option<PathBuf>,
    pub(super) imports: Vec<ImportRef>,
    pub(super) variables: Vec<Variable>,
    pub(super) meta_variables: Vec<MetaVariable>,
    pub(super) blocks: Vec<Block>,
    pub(super) comments: Vec<CommentRecord>,
    /// Files in the order they were first seen (save order)
    pub(super) known_files: Vec<PathBuf>,
    /// Files ranked by override precedence, lowest first
    pub(super) precedence: Vec<PathBuf>,
    pub(super) parsed_files: HashSet<PathBuf>,
}

trait Entry {
    fn name(&self) -> &str;
    fn file(&self) -> &Path;
}

impl Entry for Variable {
    fn name(&self) -> &str {
        &self.name
    }
    fn file(&self) -> &Path {
        &self.file
    }
}

impl Entry for Block {
    fn name(&self) -> &str {
        &self.name
    }
    fn file(&self) -> &Path {
        &self.file
    }
}

impl SettingsStore {
    /// Root settings file, `None` for a store loaded from an unresolved location
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
            && self.meta_variables.is_empty()
            && self.blocks.is_empty()
            && self.imports.iter().all(|i| i.is_root)
    }

    fn root_or_err(&self) -> Result<PathBuf> {
        self.root.clone().ok_or_else(|| {
            SettingsError::config_error("settings store has no root settings file")
        })
    }

    fn rank(&self, file: &Path) -> usize {
        self.precedence
            .iter()
            .position(|f| f == file)
            .unwrap_or(usize::MAX)
    }

    fn effective<'a, T: Entry>(&self, entries: &'a [T], name: &str) -> Option<&'a T> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.name() == name)
            .max_by_key(|(index, entry)| (self.rank(entry.file()), *index))
            .map(|(_, entry)| entry)
    }

    /// Remember a file for saving
    pub(super) fn note_file(&mut self, file: &Path) {
        if !self.known_files.iter().any(|f| f == file) {
            self.known_files.push(file.to_path_buf());
        }
    }

    /// Remember a file and give it a precedence rank if it has none
    pub(super) fn note_ranked_file(&mut self, file: &Path) {
        self.note_file(file);
        if !self.precedence.iter().any(|f| f == file) {
            self.precedence.push(file.to_path_buf());
        }
    }

    // === Variables ===

    /// Whether any file declares the variable
    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    /// Effective variable entry
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.effective(&self.variables, name)
    }

    /// Effective variable value
    pub fn variable_value(&self, name: &str) -> Option<&str> {
        self.variable(name).and_then(|v| v.value.as_deref())
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn has_variable_in(&self, file: impl AsRef<Path>, name: &str) -> bool {
        let file = paths::absolute(file.as_ref());
        self.variables
            .iter()
            .any(|v| v.file == file && v.name == name)
    }

    pub fn variable_value_in(&self, file: impl AsRef<Path>, name: &str) -> Option<&str> {
        let file = paths::absolute(file.as_ref());
        self.variables
            .iter()
            .find(|v| v.file == file && v.name == name)
            .and_then(|v| v.value.as_deref())
    }

    /// Update the variable declared by `file`, or append a new declaration for it
    pub fn add_or_update_variable(
        &mut self,
        file: impl AsRef<Path>,
        name: &str,
        value: Option<&str>,
        comments: Vec<String>,
    ) {
        let file = paths::absolute(file.as_ref());
        upsert(&mut self.variables, &file, name, value, comments);
        self.note_ranked_file(&file);
    }

    /// Set a variable in the root settings file
    pub fn set_variable(&mut self, name: &str, value: impl AsRef<str>) -> Result<()> {
        let root = self.root_or_err()?;
        self.add_or_update_variable(root, name, Some(value.as_ref()), Vec::new());
        Ok(())
    }

    /// Remove the root file's declaration; imported declarations stay
    pub fn remove_variable(&mut self, name: &str) -> bool {
        match self.root.clone() {
            Some(root) => self.remove_variable_in(root, name),
            None => false,
        }
    }

    pub fn remove_variable_in(&mut self, file: impl AsRef<Path>, name: &str) -> bool {
        let file = paths::absolute(file.as_ref());
        let before = self.variables.len();
        self.variables.retain(|v| !(v.file == file && v.name == name));
        self.variables.len() != before
    }

    /// Remove the variable from every file; returns how many declarations went away
    pub fn remove_all_variables(&mut self, name: &str) -> usize {
        let before = self.variables.len();
        self.variables.retain(|v| v.name != name);
        before - self.variables.len()
    }

    // === Meta-variables ===

    pub fn has_meta_variable(&self, name: &str) -> bool {
        self.meta_variable(name).is_some()
    }

    pub fn meta_variable(&self, name: &str) -> Option<&MetaVariable> {
        self.effective(&self.meta_variables, name)
    }

    pub fn meta_variable_value(&self, name: &str) -> Option<&str> {
        self.meta_variable(name).and_then(|v| v.value.as_deref())
    }

    pub fn meta_variables(&self) -> &[MetaVariable] {
        &self.meta_variables
    }

    pub fn add_or_update_meta_variable(
        &mut self,
        file: impl AsRef<Path>,
        name: &str,
        value: Option<&str>,
        comments: Vec<String>,
    ) {
        let file = paths::absolute(file.as_ref());
        upsert(&mut self.meta_variables, &file, name, value, comments);
        self.note_ranked_file(&file);
    }

    pub fn set_meta_variable(&mut self, name: &str, value: impl AsRef<str>) -> Result<()> {
        let root = self.root_or_err()?;
        self.add_or_update_meta_variable(root, name, Some(value.as_ref()), Vec::new());
        Ok(())
    }

    pub fn remove_meta_variable(&mut self, name: &str) -> bool {
        let Some(root) = self.root.clone() else {
            return false;
        };
        let before = self.meta_variables.len();
        self.meta_variables
            .retain(|v| !(v.file == root && v.name == name));
        self.meta_variables.len() != before
    }

    // === Blocks ===

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.effective(&self.blocks, name)
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.block(name).is_some()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Configured state of the effective block, `Unset` when there is none
    pub fn block_state(&self, name: &str) -> BlockState {
        self.block(name).map_or(BlockState::Unset, |b| b.state)
    }

    /// Raw inner markup of the effective block
    pub fn block_content(&self, name: &str) -> Option<&str> {
        self.block(name).and_then(|b| b.content.as_deref())
    }

    /// Block content mapped onto `T`; the `<block>` element is the document root
    pub fn block_content_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let Some(wrapped) = self.block(name).and_then(Block::content_with_wrapper) else {
            return Ok(None);
        };
        quick_xml::de::from_str(&wrapped)
            .map(Some)
            .map_err(|e| SettingsError::block_content(name, e))
    }

    /// Whether the block counts as enabled
    ///
    /// `!name` asks whether `name` is disabled. Otherwise `name` is first
    /// evaluated as an expression (so `$equals(DB,"pg")` works as a block
    /// name); a `true`/`false` result decides, anything else falls back to
    /// the configured block state.
    pub fn is_block_enabled(&self, name: &str) -> bool {
        if let Some(negated) = name.strip_prefix('!') {
            return self.is_block_disabled(negated);
        }
        self.block_accessibility(name)
            .unwrap_or_else(|| self.block_state(name) == BlockState::Enabled)
    }

    /// Whether the block counts as disabled; see [`Self::is_block_enabled`]
    pub fn is_block_disabled(&self, name: &str) -> bool {
        if let Some(negated) = name.strip_prefix('!') {
            return self.is_block_enabled(negated);
        }
        self.block_accessibility(name)
            .map(|enabled| !enabled)
            .unwrap_or_else(|| self.block_state(name) == BlockState::Disabled)
    }

    fn block_accessibility(&self, name: &str) -> Option<bool> {
        let value = expression::evaluate(name, "", self)?;
        if is_true(&value) {
            Some(true)
        } else if is_false(&value) {
            Some(false)
        } else {
            None
        }
    }

    pub fn has_enabled_or_disabled_blocks(&self) -> bool {
        self.blocks.iter().any(|b| b.state != BlockState::Unset)
    }

    pub fn has_content_blocks(&self) -> bool {
        self.blocks.iter().any(|b| b.content.is_some())
    }

    /// Update the block declared by `file`, or append a new declaration for it
    ///
    /// A block with a state also declares a same-named variable holding
    /// `"true"` or `"false"`.
    pub fn add_or_update_block(
        &mut self,
        file: impl AsRef<Path>,
        name: &str,
        state: BlockState,
        content: Option<&str>,
        comments: Vec<String>,
    ) {
        let file = paths::absolute(file.as_ref());
        let content = content
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string);

        match self
            .blocks
            .iter_mut()
            .find(|b| b.file == file && b.name == name)
        {
            Some(block) => {
                block.state = state;
                block.content = content;
                block.comments.extend(comments);
            }
            None => self.blocks.push(Block {
                name: name.to_string(),
                state,
                content,
                file: file.clone(),
                comments,
            }),
        }

        match state.as_bool() {
            Some(enabled) => {
                let value = bool_str(enabled);
                upsert(&mut self.variables, &file, name, Some(&value), Vec::new());
            }
            None => {
                self.variables
                    .retain(|v| !(v.file == file && v.name == name));
            }
        }
        self.note_ranked_file(&file);
    }

    /// Set a block in the root settings file
    pub fn set_block(&mut self, name: &str, state: BlockState, content: Option<&str>) -> Result<()> {
        let root = self.root_or_err()?;
        self.add_or_update_block(root, name, state, content, Vec::new());
        Ok(())
    }

    /// Set a block in the root file with content serialized from `value`
    pub fn set_block_value<T: Serialize>(
        &mut self,
        name: &str,
        state: BlockState,
        value: &T,
    ) -> Result<()> {
        let markup = quick_xml::se::to_string_with_root("block", value)
            .map_err(|e| SettingsError::block_content(name, e))?;
        let document =
            parse_document(&markup).map_err(|e| SettingsError::block_content(name, e))?;
        let content = write_nodes(&document.root.children);
        self.set_block(name, state, Some(&content))
    }

    /// Remove the root file's block together with its state variable
    pub fn remove_block(&mut self, name: &str) -> bool {
        let Some(root) = self.root.clone() else {
            return false;
        };
        let before = self.blocks.len();
        self.blocks.retain(|b| !(b.file == root && b.name == name));
        let removed = self.blocks.len() != before;
        if removed {
            self.variables
                .retain(|v| !(v.file == root && v.name == name));
        }
        removed
    }

    // === Imports ===

    /// All import entries, the synthesized root entry included
    pub fn imports(&self) -> &[ImportRef] {
        &self.imports
    }

    /// Register an import in `file` and parse its target right away
    ///
    /// Imports are matched by resolved path, so `base.xml` and `./base.xml`
    /// written in the same file are the same import.
    pub fn add_or_update_import(
        &mut self,
        file: impl AsRef<Path>,
        from: &str,
        comments: Vec<String>,
    ) -> Result<()> {
        let owner = paths::absolute(file.as_ref());
        let path = paths::resolve(paths::parent_dir(&owner), Path::new(from));

        if let Some(existing) = self
            .imports
            .iter_mut()
            .find(|i| !i.is_root && i.file == owner && i.path == path)
        {
            existing.from = from.to_string();
            existing.comments.extend(comments);
            return Ok(());
        }

        // A failed parse leaves no trace of the import or of its partial subtree
        let snapshot = self.clone();
        self.imports.push(ImportRef {
            from: from.to_string(),
            path: path.clone(),
            file: owner.clone(),
            is_root: false,
            comments,
        });
        self.note_ranked_file(&owner);

        // The new subtree ranks right below the importing file
        let start = self.precedence.len();
        if let Err(e) = self.parse_source(&path, &mut vec![owner.clone()]) {
            *self = snapshot;
            return Err(e);
        }
        let added: Vec<PathBuf> = self.precedence.drain(start..).collect();
        let at = self
            .precedence
            .iter()
            .position(|f| *f == owner)
            .unwrap_or(self.precedence.len());
        for (offset, added_file) in added.into_iter().enumerate() {
            self.precedence.insert(at + offset, added_file);
        }
        Ok(())
    }

    /// Register an import in the root settings file
    pub fn set_import(&mut self, from: &str) -> Result<()> {
        let root = self.root_or_err()?;
        self.add_or_update_import(root, from, Vec::new())
    }

    /// Whether some import designates `name` (literal path, absolute path or file name)
    pub fn has_import(&self, name: &str) -> bool {
        self.imports
            .iter()
            .any(|i| !i.is_root && i.matches(name))
    }

    /// Remove an import of the root file and forget files no longer reachable
    pub fn remove_import(&mut self, name: &str) -> bool {
        let Some(root) = self.root.clone() else {
            return false;
        };
        let before = self.imports.len();
        self.imports
            .retain(|i| i.is_root || i.file != root || !i.matches(name));
        let removed = self.imports.len() != before;
        if removed {
            self.prune_unreachable(&root);
        }
        removed
    }

    fn prune_unreachable(&mut self, root: &Path) {
        let mut reachable: HashSet<PathBuf> = HashSet::from([root.to_path_buf()]);
        loop {
            let before = reachable.len();
            for import in &self.imports {
                if !import.is_root && reachable.contains(&import.file) {
                    reachable.insert(import.path.clone());
                }
            }
            if reachable.len() == before {
                break;
            }
        }

        self.imports
            .retain(|i| i.is_root || reachable.contains(&i.file));
        self.variables.retain(|v| reachable.contains(&v.file));
        self.meta_variables.retain(|v| reachable.contains(&v.file));
        self.blocks.retain(|b| reachable.contains(&b.file));
        self.comments.retain(|c| reachable.contains(&c.file));
        self.known_files.retain(|f| reachable.contains(f));
        self.precedence.retain(|f| reachable.contains(f));
        self.parsed_files.retain(|f| reachable.contains(f));
    }

    /// Absolute paths of every import reachable from the root, in parse order
    ///
    /// Missing import files are included.
    pub fn all_imports(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.imports
            .iter()
            .filter(|i| !i.is_root)
            .filter(|i| seen.insert(i.path.clone()))
            .map(|i| i.path.clone())
            .collect()
    }

    /// Root file plus every import: the files whose changes matter
    pub fn watched_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.root.iter().cloned().collect();
        for import in self.all_imports() {
            if !files.contains(&import) {
                files.push(import);
            }
        }
        files
    }

    // === Comments ===

    /// Comments not attached to any entry
    pub fn comments(&self) -> &[CommentRecord] {
        &self.comments
    }

    pub fn add_comment(&mut self, file: impl AsRef<Path>, text: impl Into<String>) {
        let file = paths::absolute(file.as_ref());
        self.comments.push(CommentRecord {
            text: text.into(),
            file: file.clone(),
        });
        self.note_ranked_file(&file);
    }

    // === Typed access ===

    /// Variable value parsed into `T`; missing, empty or unparsable values give `None`
    pub fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        self.variable_value(name)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok())
    }

    /// Like [`Self::get`] with a fallback
    pub fn get_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.get(name).unwrap_or(default)
    }

    /// Like [`Self::get`] with a lazily computed fallback
    pub fn get_or_else<T: FromStr>(&self, name: &str, default: impl FnOnce() -> T) -> T {
        self.get(name).unwrap_or_else(default)
    }

    /// Store the string form of `value` in the root file
    pub fn set<T: Display>(&mut self, name: &str, value: T) -> Result<()> {
        self.set_variable(name, value.to_string())
    }

    /// Variable value as a boolean, `true`/`false` in any case
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        let value = self.variable_value(name)?;
        if is_true(value) {
            Some(true)
        } else if is_false(value) {
            Some(false)
        } else {
            None
        }
    }
}

fn upsert(
    entries: &mut Vec<Variable>,
    file: &Path,
    name: &str,
    value: Option<&str>,
    comments: Vec<String>,
) {
    match entries
        .iter_mut()
        .find(|v| v.file == file && v.name == name)
    {
        Some(existing) => {
            existing.value = value.map(str::to_string);
            existing.comments.extend(comments);
        }
        None => entries.push(Variable {
            name: name.to_string(),
            value: value.map(str::to_string),
            file: file.to_path_buf(),
            comments,
        }),
    }
}

impl ValueResolver for SettingsStore {
    fn variable_value(&self, name: &str) -> Option<&str> {
        SettingsStore::variable_value(self, name)
    }

    fn block_enabled(&self, name: &str) -> Option<bool> {
        self.block_state(name).as_bool()
    }
}
