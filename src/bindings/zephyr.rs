//! Zephyr-style tree-shaped YAML bindings (`spec.md` §4.6). Each file
//! describes one `compatible`, an optional `include` chain, `properties`,
//! bus membership, `*-cells` specifier lists, and an optional
//! `child-binding`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};

use super::node_type::{NodeType, PropertyDef, PropertyMatcher, Requiredness, ValueTypeKind};

#[derive(Debug, Clone, Deserialize, Default)]
struct RawBinding {
    compatible: Option<String>,
    #[allow(dead_code)]
    description: Option<String>,
    #[serde(default)]
    properties: HashMap<String, RawProperty>,
    #[serde(default, deserialize_with = "deserialize_include")]
    include: Vec<IncludeRef>,
    #[serde(default)]
    bus: Option<BusList>,
    #[serde(rename = "on-bus")]
    on_bus: Option<String>,
    #[serde(rename = "child-binding")]
    child_binding: Option<Box<RawBinding>>,
    #[serde(flatten)]
    extra: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BusList {
    One(String),
    Many(Vec<String>),
}

impl BusList {
    fn into_vec(self) -> Vec<String> {
        match self {
            BusList::One(s) => vec![s],
            BusList::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawProperty {
    #[serde(rename = "type")]
    type_name: Option<String>,
    required: Option<bool>,
    #[serde(default)]
    deprecated: bool,
    description: Option<String>,
    #[serde(rename = "enum")]
    enum_values: Option<Vec<serde_yaml::Value>>,
    #[serde(rename = "const")]
    const_value: Option<serde_yaml::Value>,
    default: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone)]
struct IncludeRef {
    name: String,
    property_allowlist: Option<Vec<String>>,
    property_blocklist: Option<Vec<String>>,
}

fn deserialize_include<'de, D>(deserializer: D) -> Result<Vec<IncludeRef>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawInclude {
        Name(String),
        Names(Vec<String>),
        Entry {
            name: String,
            #[serde(rename = "property-allowlist")]
            property_allowlist: Option<Vec<String>>,
            #[serde(rename = "property-blocklist")]
            property_blocklist: Option<Vec<String>>,
        },
        Entries(Vec<IncludeEntryOrName>),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IncludeEntryOrName {
        Name(String),
        Entry {
            name: String,
            #[serde(rename = "property-allowlist")]
            property_allowlist: Option<Vec<String>>,
            #[serde(rename = "property-blocklist")]
            property_blocklist: Option<Vec<String>>,
        },
    }

    let raw = Option::<RawInclude>::deserialize(deserializer)?;
    let refs = match raw {
        None => Vec::new(),
        Some(RawInclude::Name(n)) => vec![IncludeRef {
            name: n,
            property_allowlist: None,
            property_blocklist: None,
        }],
        Some(RawInclude::Names(ns)) => ns
            .into_iter()
            .map(|n| IncludeRef {
                name: n,
                property_allowlist: None,
                property_blocklist: None,
            })
            .collect(),
        Some(RawInclude::Entry { name, property_allowlist, property_blocklist }) => vec![IncludeRef {
            name,
            property_allowlist,
            property_blocklist,
        }],
        Some(RawInclude::Entries(entries)) => entries
            .into_iter()
            .map(|e| match e {
                IncludeEntryOrName::Name(n) => IncludeRef {
                    name: n,
                    property_allowlist: None,
                    property_blocklist: None,
                },
                IncludeEntryOrName::Entry { name, property_allowlist, property_blocklist } => IncludeRef {
                    name,
                    property_allowlist,
                    property_blocklist,
                },
            })
            .collect(),
    };
    Ok(refs)
}

/// Loads one Zephyr binding file, resolving its `include` chain against
/// `search_roots` by filename. Include merges copy properties from the
/// base honoring `property-allowlist`/`property-blocklist`; cell-specifier
/// lists and `bus` lists are unioned across the chain (`spec.md` §4.6).
pub fn load_zephyr_binding(
    path: &Path,
    search_roots: &[PathBuf],
    diagnostics: &mut Vec<DtsDiagnostic>,
) -> Option<NodeType> {
    let mut visited = Vec::new();
    load_zephyr_recursive(path, search_roots, diagnostics, &mut visited)
}

fn load_zephyr_recursive(
    path: &Path,
    search_roots: &[PathBuf],
    diagnostics: &mut Vec<DtsDiagnostic>,
    visited: &mut Vec<PathBuf>,
) -> Option<NodeType> {
    if visited.contains(&path.to_path_buf()) {
        return None;
    }
    visited.push(path.to_path_buf());

    let contents = std::fs::read_to_string(path).ok()?;
    let raw: RawBinding = match serde_yaml::from_str(&contents) {
        Ok(r) => r,
        Err(err) => {
            diagnostics.push(
                DtsDiagnostic::new(DiagnosticKind::ReadFailure, Default::default())
                    .with_args([path.display().to_string(), err.to_string()]),
            );
            return None;
        }
    };

    let mut node_type = NodeType {
        name: raw.compatible.clone().unwrap_or_default(),
        properties: Vec::new(),
        child_binding: None,
        bus: raw.bus.clone().map(BusList::into_vec).unwrap_or_default(),
        on_bus: raw.on_bus.clone(),
        cell_specifiers: HashMap::new(),
    };

    for include in &raw.include {
        let Some(included_path) = find_in_roots(search_roots, &include.name) else {
            diagnostics.push(
                DtsDiagnostic::new(DiagnosticKind::MissingBindingFile, Default::default())
                    .with_args([include.name.clone()]),
            );
            continue;
        };
        if let Some(base) = load_zephyr_recursive(&included_path, search_roots, diagnostics, visited) {
            merge_included(&mut node_type, base, include);
        }
    }

    for (name, raw_prop) in &raw.properties {
        node_type.properties.push(property_def_from_raw(name, raw_prop));
    }

    for (key, value) in &raw.extra {
        if let Some(specifier) = key.strip_suffix("-cells") {
            if let serde_yaml::Value::Sequence(items) = value {
                node_type.cell_specifiers.insert(specifier.to_string(), items.len() as u32);
            }
        }
    }

    if let Some(child) = raw.child_binding {
        let child_type = zephyr_from_inline(*child, search_roots, diagnostics, visited);
        node_type.child_binding = Some(Rc::new(child_type));
    }

    Some(node_type)
}

fn zephyr_from_inline(
    raw: RawBinding,
    search_roots: &[PathBuf],
    diagnostics: &mut Vec<DtsDiagnostic>,
    visited: &mut Vec<PathBuf>,
) -> NodeType {
    let mut node_type = NodeType {
        name: raw.compatible.clone().unwrap_or_default(),
        properties: Vec::new(),
        child_binding: None,
        bus: raw.bus.clone().map(BusList::into_vec).unwrap_or_default(),
        on_bus: raw.on_bus.clone(),
        cell_specifiers: HashMap::new(),
    };
    for include in &raw.include {
        if let Some(included_path) = find_in_roots(search_roots, &include.name) {
            if let Some(base) = load_zephyr_recursive(&included_path, search_roots, diagnostics, visited) {
                merge_included(&mut node_type, base, include);
            }
        }
    }
    for (name, raw_prop) in &raw.properties {
        node_type.properties.push(property_def_from_raw(name, raw_prop));
    }
    node_type
}

fn merge_included(target: &mut NodeType, base: NodeType, include: &IncludeRef) {
    for prop in base.properties {
        let PropertyMatcher::Literal(name) = &prop.matcher else {
            target.properties.push(prop);
            continue;
        };
        if let Some(allow) = &include.property_allowlist {
            if !allow.contains(name) {
                continue;
            }
        }
        if let Some(block) = &include.property_blocklist {
            if block.contains(name) {
                continue;
            }
        }
        target.properties.push(prop);
    }
    for bus in base.bus {
        if !target.bus.contains(&bus) {
            target.bus.push(bus);
        }
    }
    for (k, v) in base.cell_specifiers {
        target.cell_specifiers.entry(k).or_insert(v);
    }
    if target.on_bus.is_none() {
        target.on_bus = base.on_bus;
    }
}

fn property_def_from_raw(name: &str, raw: &RawProperty) -> PropertyDef {
    let allowed_types = match raw.type_name.as_deref() {
        Some("boolean") => vec![ValueTypeKind::Boolean],
        Some("int") => vec![ValueTypeKind::Int],
        Some("array") => vec![ValueTypeKind::IntArray],
        Some("string") => vec![ValueTypeKind::String],
        Some("string-array") => vec![ValueTypeKind::StringList],
        Some("uint8-array") => vec![ValueTypeKind::Bytes],
        Some("phandle") | Some("phandle-array") | Some("phandles") => vec![ValueTypeKind::PhandleArray],
        Some("compound") | None => vec![ValueTypeKind::Compound],
        Some(_) => vec![ValueTypeKind::Compound],
    };

    PropertyDef {
        matcher: PropertyMatcher::Literal(name.to_string()),
        allowed_types,
        required: if raw.required.unwrap_or(false) {
            Requiredness::Required
        } else {
            Requiredness::Optional
        },
        enum_values: raw.enum_values.as_ref().map(|vs| vs.iter().map(value_to_string).collect()),
        const_value: raw.const_value.as_ref().map(value_to_string),
        default: raw.default.as_ref().map(value_to_string),
        description: raw.description.clone(),
        deprecated: raw.deprecated,
    }
}

fn value_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

fn find_in_roots(roots: &[PathBuf], filename: &str) -> Option<PathBuf> {
    for root in roots {
        let candidate = root.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        if let Ok(entries) = std::fs::read_dir(root) {
            for entry in entries.flatten() {
                if entry.file_name().to_string_lossy() == filename {
                    return Some(entry.path());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_properties_and_cell_specifiers() {
        let dir = std::env::temp_dir().join(format!(
            "dts_ls_zephyr_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gpio-controller.yaml");
        fs::write(
            &path,
            r#"
compatible: "vnd,gpio"
properties:
  reg:
    type: array
    required: true
gpio-cells:
  - pin
  - flags
"#,
        )
        .unwrap();

        let mut diags = Vec::new();
        let node_type = load_zephyr_binding(&path, &[], &mut diags).expect("loaded");
        assert_eq!(node_type.name, "vnd,gpio");
        assert_eq!(node_type.cell_specifiers.get("gpio"), Some(&2));
        assert!(node_type.find_property("reg").is_some());

        let _ = fs::remove_dir_all(&dir);
    }
}
