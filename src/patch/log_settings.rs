//! Logging configuration fixup
//!
//! Extension assemblies in an `nlog` document are referenced relative to the
//! template; the live file may end up in another directory, so their paths
//! are made absolute.

use std::path::Path;

use crate::paths;
use crate::xml::Element;

const ASSEMBLY_FILE: &str = "assemblyFile";

/// Rewrites `nlog/extensions/add@assemblyFile` against the template directory
#[derive(Debug, Clone, Copy)]
pub struct LogSettingsFixup;

impl LogSettingsFixup {
    /// Returns how many paths were rewritten
    pub fn apply(root: &mut Element, config_path: &Path) -> usize {
        if root.local_name() != "nlog" {
            return 0;
        }
        let Some(extensions) = root.elements_mut().find(|e| e.local_name() == "extensions") else {
            return 0;
        };

        let config_dir = paths::parent_dir(config_path);
        let mut rewritten = 0;
        for add in extensions.elements_mut().filter(|e| e.local_name() == "add") {
            let Some(file) = add.attribute(ASSEMBLY_FILE) else {
                continue;
            };
            let absolute = paths::resolve(config_dir, Path::new(file));
            add.set_attribute(ASSEMBLY_FILE, absolute.to_string_lossy().into_owned());
            rewritten += 1;
        }
        rewritten
    }
}
