//! Patch engine
//!
//! Interprets the directive comments of a target document:
//! - `{~NAME}` block markers (see [`BlockAccessor`])
//! - `{@attr=EXPR}` / `{@=EXPR}` value setters (see [`SetterWalker`])
//!
//! Blocks are resolved first so that setters also reach uncommented markup.

pub mod block_accessor;
pub mod expression;
mod log_settings;
mod setter;
mod walker;

pub use block_accessor::{BlockAccessor, marker_name};
pub use expression::{Expression, ValueResolver};
pub use log_settings::LogSettingsFixup;
pub use setter::{REMOVE_VALUE, Setter};
pub use walker::SetterWalker;

use crate::settings::SettingsStore;
use crate::xml::Document;

/// What a patch run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Nodes uncommented, commented out or refilled by block markers
    pub block_changes: usize,
    /// Attribute and text values changed by setters
    pub value_changes: usize,
}

/// Apply block markers, then setters, to `document`
pub fn patch(document: &mut Document, store: &SettingsStore) -> PatchReport {
    let block_changes = BlockAccessor::new(store).apply(&mut document.root);
    let value_changes = SetterWalker::patch(&mut document.root, store);
    tracing::debug!(block_changes, value_changes, "Document patched");
    PatchReport {
        block_changes,
        value_changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{BlockState, SettingsLocation};
    use crate::xml::{parse_document, write_document};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_setters_reach_uncommented_block() {
        let mut store = SettingsStore::load(&SettingsLocation::Unresolved).unwrap();
        let file = "/cfg/_ConfigSettings.xml";
        store.add_or_update_block(file, "CACHE", BlockState::Enabled, None, Vec::new());
        store.add_or_update_variable(file, "CACHE_SIZE", Some("512"), Vec::new());

        let mut document = parse_document(
            "<configuration>\n  <!--{@size=CACHE_SIZE}-->\n  <!--{~CACHE}-->\n  <!--<cache size=\"1\" />-->\n</configuration>",
        )
        .unwrap();
        let report = patch(&mut document, &store);

        assert_eq!(
            report,
            PatchReport {
                block_changes: 1,
                value_changes: 1,
            }
        );
        assert_eq!(
            write_document(&document),
            "<configuration>\n  <!--{@size=CACHE_SIZE}-->\n  <!--{~CACHE}-->\n  <cache size=\"512\" />\n</configuration>"
        );
    }
}
