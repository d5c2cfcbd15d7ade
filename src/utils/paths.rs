use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::Url;

/// Resolves an `#include`/`/include/` target against the configured include
/// path list, falling back to the including file's directory and finally the
/// workspace root, mirroring a C preprocessor's search order.
pub fn resolve_include_path(
    workspace_root: Option<&Path>,
    include_paths: &[String],
    current_file: &Path,
    include: &str,
) -> Option<PathBuf> {
    let candidate = PathBuf::from(include);
    if candidate.is_absolute() {
        return Some(candidate);
    }

    for entry in include_paths {
        let Some(base) = resolve_config_path(workspace_root, entry) else {
            continue;
        };
        let from_include_dir = base.join(include);
        if from_include_dir.exists() {
            return Some(from_include_dir);
        }
    }

    if let Some(current_dir) = current_file.parent() {
        let from_current = current_dir.join(include);
        if from_current.exists() {
            return Some(from_current);
        }
    }

    if let Some(root) = workspace_root {
        let from_root = root.join(include);
        if from_root.exists() {
            return Some(from_root);
        }
    }

    None
}

/// Resolves a settings-provided path (binding root, include dir, dumpfile…)
/// against the workspace root if it is relative.
pub fn resolve_config_path(workspace_root: Option<&Path>, value: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(value);
    if candidate.is_absolute() {
        return Some(candidate);
    }
    workspace_root.map(|root| root.join(candidate))
}

/// Recursively globs `**/*.yaml` under `root`, skipping anything under a
/// `test/` path component — the convention binding trees use to keep
/// fixtures out of the real binding set (`spec.md` §6 "Binding file layout").
pub fn glob_binding_yaml_files(root: &Path) -> Vec<PathBuf> {
    let Some(root_str) = root.to_str() else {
        return Vec::new();
    };
    let pattern = format!("{}/**/*.yaml", root_str.trim_end_matches('/'));
    let Ok(paths) = glob::glob(&pattern) else {
        return Vec::new();
    };

    paths
        .filter_map(Result::ok)
        .filter(|p| !path_has_component(p, "test"))
        .collect()
}

fn path_has_component(path: &Path, name: &str) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_str() == Some(name))
}

pub fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok()
}

pub fn normalize_path_for_match(raw: &str) -> String {
    raw.replace('\\', "/").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn include_resolution_prefers_configured_dirs_then_current_then_root() {
        let base = std::env::temp_dir().join(format!(
            "dts_ls_paths_test_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("epoch")
                .as_nanos()
        ));
        let workspace = base.join("workspace");
        let include_dir = base.join("includes");
        let current_dir = base.join("current");
        fs::create_dir_all(&workspace).expect("workspace");
        fs::create_dir_all(&include_dir).expect("include dir");
        fs::create_dir_all(&current_dir).expect("current");

        let include = "common.dtsi";
        let configured = include_dir.join(include);
        let current_include = current_dir.join(include);
        let root_include = workspace.join(include);
        fs::write(&configured, "/* configured */").expect("write configured");
        fs::write(&current_include, "/* current */").expect("write current");
        fs::write(&root_include, "/* root */").expect("write root");

        let current_file = current_dir.join("board.dts");
        let include_paths = vec![include_dir.to_string_lossy().to_string()];

        let resolved =
            resolve_include_path(Some(&workspace), &include_paths, &current_file, include)
                .expect("resolved");
        assert_eq!(resolved, configured);

        fs::remove_file(&configured).expect("remove configured");
        let resolved =
            resolve_include_path(Some(&workspace), &include_paths, &current_file, include)
                .expect("resolved");
        assert_eq!(resolved, current_include);

        fs::remove_file(&current_include).expect("remove current");
        let resolved =
            resolve_include_path(Some(&workspace), &include_paths, &current_file, include)
                .expect("resolved");
        assert_eq!(resolved, root_include);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn glob_skips_test_directories() {
        let base = std::env::temp_dir().join(format!(
            "dts_ls_glob_test_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("epoch")
                .as_nanos()
        ));
        let bindings = base.join("bindings");
        let test_dir = bindings.join("test");
        fs::create_dir_all(&test_dir).expect("test dir");
        fs::write(bindings.join("gpio.yaml"), "compatible: foo").expect("write binding");
        fs::write(test_dir.join("gpio.yaml"), "compatible: test-only")
            .expect("write test binding");

        let found = glob_binding_yaml_files(&bindings);
        assert!(found.iter().any(|p| p.ends_with("gpio.yaml")));
        assert!(found.iter().all(|p| !path_has_component(p, "test")));

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn uri_to_path_roundtrips_file_uri() {
        let uri = Url::parse("file:///tmp/board.dts").expect("parse uri");
        assert_eq!(uri_to_path(&uri), Some(PathBuf::from("/tmp/board.dts")));
    }
}
