//! Settings object (`spec.md` §6) plus an `inherits`-chain TOML project
//! config, adapted from the same merge-by-override mechanism used for the
//! original editor config.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tower_lsp::lsp_types::InitializeParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingDialect {
    Zephyr,
    DevicetreeOrg,
    None,
}

impl Default for BindingDialect {
    fn default() -> Self {
        BindingDialect::Zephyr
    }
}

/// The settings object a client sends via `initializationOptions` /
/// `didChangeConfiguration` / the `setDefaultSettings` request
/// (`spec.md` §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DtsConfig {
    pub default_include_paths: Vec<String>,
    pub default_binding_type: BindingDialect,
    pub zephyr_bindings: Vec<String>,
    pub device_org_tree_bindings: Vec<String>,
    pub device_org_bindings_meta_schema: Vec<String>,
    pub default_lock_rename_edits: bool,
    pub cwd: Option<String>,
}

impl Default for DtsConfig {
    fn default() -> Self {
        Self {
            default_include_paths: Vec::new(),
            default_binding_type: BindingDialect::default(),
            zephyr_bindings: Vec::new(),
            device_org_tree_bindings: Vec::new(),
            device_org_bindings_meta_schema: Vec::new(),
            default_lock_rename_edits: false,
            cwd: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDtsConfig {
    pub config: DtsConfig,
    pub path: Option<PathBuf>,
}

pub fn find_workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    if let Some(folders) = &params.workspace_folders {
        for folder in folders {
            if let Ok(path) = folder.uri.to_file_path() {
                return Some(path);
            }
        }
    }

    if let Some(root_uri) = &params.root_uri
        && let Ok(path) = root_uri.to_file_path()
    {
        return Some(path);
    }

    None
}

/// Parses `initializationOptions` as a `DtsConfig`, falling back to
/// defaults (then the project file) on anything that doesn't deserialize.
pub fn from_initialization_options(value: Option<&serde_json::Value>) -> Option<DtsConfig> {
    let value = value?;
    serde_json::from_value(value.clone()).ok()
}

pub async fn load_from_workspace_root(root: Option<&Path>) -> LoadedDtsConfig {
    let Some(root) = root else {
        return LoadedDtsConfig {
            config: DtsConfig::default(),
            path: None,
        };
    };

    let path = root.join("dts.toml");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => match toml::from_str::<PartialDtsConfig>(&contents) {
            Ok(root_partial) => LoadedDtsConfig {
                config: load_with_inheritance(&path, root_partial).await,
                path: Some(path),
            },
            Err(_) => LoadedDtsConfig {
                config: DtsConfig::default(),
                path: Some(path),
            },
        },
        Err(err) if err.kind() == ErrorKind::NotFound => LoadedDtsConfig {
            config: DtsConfig::default(),
            path: Some(path),
        },
        Err(_) => LoadedDtsConfig {
            config: DtsConfig::default(),
            path: Some(path),
        },
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct PartialDtsConfig {
    #[serde(default, deserialize_with = "deserialize_optional_string_or_vec")]
    inherits: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_vec")]
    default_include_paths: Option<Vec<String>>,
    default_binding_type: Option<BindingDialect>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_vec")]
    zephyr_bindings: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_vec")]
    device_org_tree_bindings: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_vec")]
    device_org_bindings_meta_schema: Option<Vec<String>>,
    default_lock_rename_edits: Option<bool>,
    cwd: Option<String>,
}

async fn load_with_inheritance(path: &Path, root_partial: PartialDtsConfig) -> DtsConfig {
    let root_identity = path_identity(path);
    let mut partials = HashMap::<PathBuf, PartialDtsConfig>::new();
    partials.insert(root_identity.clone(), root_partial);

    let mut visited = HashSet::<PathBuf>::new();
    let mut visiting = HashSet::<PathBuf>::new();
    let mut order = Vec::<PathBuf>::new();
    let mut stack = vec![(root_identity, false)];

    while let Some((current, exit)) = stack.pop() {
        if exit {
            visiting.remove(&current);
            visited.insert(current.clone());
            order.push(current);
            continue;
        }

        if visited.contains(&current) || visiting.contains(&current) {
            continue;
        }
        visiting.insert(current.clone());

        let current_partial = if let Some(cfg) = partials.get(&current).cloned() {
            cfg
        } else {
            match read_partial_config(&current).await {
                Some(cfg) => {
                    partials.insert(current.clone(), cfg.clone());
                    cfg
                }
                None => {
                    visiting.remove(&current);
                    visited.insert(current);
                    continue;
                }
            }
        };

        stack.push((current.clone(), true));

        if let Some(inherits) = current_partial.inherits {
            for inherited in inherits.iter().rev() {
                let inherited_path = resolve_inherited_path(&current, inherited);
                let inherited_identity = path_identity(&inherited_path);
                if visited.contains(&inherited_identity) || visiting.contains(&inherited_identity) {
                    continue;
                }

                if let std::collections::hash_map::Entry::Vacant(entry) =
                    partials.entry(inherited_identity.clone())
                    && let Some(cfg) = read_partial_config(&inherited_identity).await
                {
                    entry.insert(cfg);
                    stack.push((inherited_identity, false));
                }
            }
        }
    }

    let mut merged = DtsConfig::default();
    for config_path in order {
        if let Some(partial) = partials.get(&config_path) {
            merge_partial_into(&mut merged, partial);
        }
    }
    merged
}

async fn read_partial_config(path: &Path) -> Option<PartialDtsConfig> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    toml::from_str::<PartialDtsConfig>(&contents).ok()
}

fn resolve_inherited_path(current_config_path: &Path, inherited: &str) -> PathBuf {
    let inherited_path = PathBuf::from(inherited);
    if inherited_path.is_absolute() {
        inherited_path
    } else {
        current_config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(inherited_path)
    }
}

fn path_identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn merge_partial_into(base: &mut DtsConfig, partial: &PartialDtsConfig) {
    if let Some(v) = &partial.default_include_paths {
        base.default_include_paths = v.clone();
    }
    if let Some(v) = partial.default_binding_type {
        base.default_binding_type = v;
    }
    if let Some(v) = &partial.zephyr_bindings {
        base.zephyr_bindings = v.clone();
    }
    if let Some(v) = &partial.device_org_tree_bindings {
        base.device_org_tree_bindings = v.clone();
    }
    if let Some(v) = &partial.device_org_bindings_meta_schema {
        base.device_org_bindings_meta_schema = v.clone();
    }
    if let Some(v) = partial.default_lock_rename_edits {
        base.default_lock_rename_edits = v;
    }
    if let Some(v) = &partial.cwd {
        base.cwd = Some(v.clone());
    }
}

fn deserialize_optional_string_or_vec<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        Single(String),
        Multiple(Vec<String>),
    }

    let parsed = Option::<StringOrVec>::deserialize(deserializer)?;
    Ok(parsed.map(|v| match v {
        StringOrVec::Single(path) => vec![path],
        StringOrVec::Multiple(paths) => paths,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_include_paths_as_single_string() {
        let cfg: DtsConfig = toml::from_str(
            r#"
default_include_paths = "include"
default_binding_type = "zephyr"
"#,
        )
        .expect("parse config");

        assert_eq!(cfg.default_include_paths, vec!["include"]);
        assert_eq!(cfg.default_binding_type, BindingDialect::Zephyr);
    }

    #[test]
    fn parses_binding_roots_as_arrays() {
        let cfg: DtsConfig = toml::from_str(
            r#"
zephyr_bindings = ["dts/bindings", "boards/bindings"]
default_lock_rename_edits = true
"#,
        )
        .expect("parse config");

        assert_eq!(cfg.zephyr_bindings, vec!["dts/bindings", "boards/bindings"]);
        assert!(cfg.default_lock_rename_edits);
    }

    #[tokio::test]
    async fn loads_inherited_config_and_applies_child_overrides() {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let base_dir = std::env::temp_dir().join(format!("dts-ls-config-{ts}"));
        std::fs::create_dir_all(&base_dir).expect("create temp dir");

        let parent = base_dir.join("base.toml");
        let child = base_dir.join("dts.toml");

        std::fs::write(
            &parent,
            r#"
default_include_paths = ["parent/includes"]
default_binding_type = "devicetree-org"
"#,
        )
        .expect("write parent config");

        std::fs::write(
            &child,
            r#"
inherits = "base.toml"
default_include_paths = ["child/includes"]
"#,
        )
        .expect("write child config");

        let loaded = load_from_workspace_root(Some(&base_dir)).await;
        assert_eq!(loaded.config.default_binding_type, BindingDialect::DevicetreeOrg);
        assert_eq!(loaded.config.default_include_paths, vec!["child/includes"]);

        let _ = std::fs::remove_dir_all(&base_dir);
    }
}
