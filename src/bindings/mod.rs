//! Binding / type engine (`spec.md` §4.6): resolves a `NodeType` per node
//! from either binding dialect or a standard default, then runs the
//! standard property checks over the resolved runtime tree.

pub mod checks;
pub mod node_type;
pub mod schema;
pub mod zephyr;

use std::path::{Path, PathBuf};
use std::rc::Rc;

pub use checks::{run_standard_checks, STATUS_VALUES};
pub use node_type::{NodeType, PropertyDef, PropertyMatcher, PropertyType, Requiredness, ValueTypeKind};
pub use schema::{load_schema_bindings, JsonSchemaBinding};
pub use zephyr::load_zephyr_binding;

use crate::diagnostics::DtsDiagnostic;
use crate::runtime::RuntimeTree;

/// All bindings discovered under the configured search roots, covering
/// both dialects (`spec.md` §4.6).
#[derive(Default)]
pub struct BindingLibrary {
    zephyr_by_compatible: std::collections::HashMap<String, Rc<NodeType>>,
    schema_by_compatible: std::collections::HashMap<String, JsonSchemaBinding>,
}

impl BindingLibrary {
    /// Scans `roots` for `*.yaml` files, loading each as a Zephyr-style
    /// binding or a devicetree.org-style JSON-Schema document depending on
    /// whether it carries a `$id`.
    pub fn load(roots: &[PathBuf], diagnostics: &mut Vec<DtsDiagnostic>) -> Self {
        let mut lib = BindingLibrary::default();
        for root in roots {
            for binding in schema::load_schema_bindings(root, diagnostics) {
                if let Some(compatible) = binding.compatible.clone() {
                    lib.schema_by_compatible.insert(compatible, binding);
                }
            }

            let Ok(entries) = std::fs::read_dir(root) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                if is_json_schema(&path) {
                    continue;
                }
                if let Some(node_type) = zephyr::load_zephyr_binding(&path, roots, diagnostics) {
                    if !node_type.name.is_empty() {
                        lib.zephyr_by_compatible.insert(node_type.name.clone(), Rc::new(node_type));
                    }
                }
            }
        }
        lib
    }

    /// Resolves the `NodeType` for `compatible[0]`, falling back to the
    /// standard default keyed by `node_name` (`spec.md` §4.6).
    pub fn resolve(&self, compatible: Option<&str>, node_name: &str) -> Option<Rc<NodeType>> {
        if let Some(compat) = compatible {
            if let Some(node_type) = self.zephyr_by_compatible.get(compat) {
                return Some(Rc::clone(node_type));
            }
        }
        NodeType::standard(node_name).map(Rc::new)
    }

    pub fn schema_for(&self, compatible: &str) -> Option<&JsonSchemaBinding> {
        self.schema_by_compatible.get(compatible)
    }
}

fn is_json_schema(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|contents| contents.contains("$id") && contents.contains("$schema"))
        .unwrap_or(false)
}

/// Attaches `NodeType`s from `library` to every node in `tree` by its
/// `compatible` property, then runs the standard property checks.
pub fn apply_bindings(
    tree: &mut RuntimeTree,
    library: &BindingLibrary,
    files: &[crate::runtime::FileAst],
) -> Vec<DtsDiagnostic> {
    for node_ref in 0..tree.nodes.len() {
        let compatible = tree
            .get(node_ref)
            .properties
            .get("compatible")
            .and_then(|p| p.quick_values.first())
            .and_then(|v| match v {
                crate::runtime::QuickValue::Str(s) => Some(s.clone()),
                _ => None,
            });
        let node_name = tree.get(node_ref).name().to_string();
        let node_type = library.resolve(compatible.as_deref(), &node_name);
        tree.get_mut(node_ref).node_type = node_type;
    }
    run_standard_checks(tree, files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_standard_default() {
        let lib = BindingLibrary::default();
        let node_type = lib.resolve(Some("vnd,unknown"), "memory").expect("standard memory type");
        assert_eq!(node_type.name, "memory");
    }
}
