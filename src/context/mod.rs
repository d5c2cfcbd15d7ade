//! Context manager (`spec.md` §4.4): owns one or more *contexts*, each a
//! main source plus ordered overlays, and rebuilds their runtime tree
//! on change. Stability is an edge-triggered signal per rebuild epoch
//! (`spec.md` §5 "Suspension points").

pub mod pipeline;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Notify, RwLock};
use tower_lsp::lsp_types::Url;

use std::collections::HashMap;

use crate::bindings::{apply_bindings, BindingLibrary};
use crate::config::DtsConfig;
use crate::diagnostics::DtsDiagnostic;
use crate::lexer::Token;
use crate::preprocessor::MacroRegistry;
use crate::runtime::{evaluate, FileAst, RuntimeTree};
use crate::utils::paths::{glob_binding_yaml_files, uri_to_path};

use pipeline::{parse_file, FsIncludeLoader, PipelineCaches};

pub type ContextId = u32;

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub uri: Url,
    pub version: i32,
    pub text: String,
}

/// A context as described by `spec.md` §4.4: `{ main source, ordered
/// overlay sources, include dirs, binding library reference, editor
/// settings }`, plus the mutable rebuild state the manager needs.
pub struct Context {
    pub id: ContextId,
    pub name: String,
    pub main: Url,
    pub overlays: Vec<Url>,
    pub files: Vec<SourceFile>,
    pub workspace_root: Option<PathBuf>,
    pub settings: DtsConfig,
    pub library: BindingLibrary,
    pub tree: RuntimeTree,
    pub diagnostics: Vec<DtsDiagnostic>,
    /// Macro names/bodies seen while preprocessing every file in this
    /// context, last-definition-wins across files (`spec.md` §6
    /// `contextMacroNames`/`evalMacros`).
    pub macros: MacroRegistry,
    /// Per-file parsed syntax trees from the last rebuild, kept around so
    /// query operations (hover, completion, goto-definition, semantic
    /// tokens) can walk concrete syntax instead of only the merged runtime
    /// tree (`spec.md` §4.7).
    pub file_asts: Vec<FileAst>,
    pub file_tokens: HashMap<tower_lsp::lsp_types::Url, Vec<Token>>,
    caches: PipelineCaches,
    epoch: AtomicU64,
    stable: Arc<Notify>,
}

impl Context {
    fn new(id: ContextId, name: String, main: Url, workspace_root: Option<PathBuf>, settings: DtsConfig) -> Self {
        Self {
            id,
            name,
            main: main.clone(),
            overlays: Vec::new(),
            files: vec![SourceFile { uri: main, version: 0, text: String::new() }],
            workspace_root,
            settings,
            library: BindingLibrary::default(),
            tree: RuntimeTree::default(),
            diagnostics: Vec::new(),
            macros: MacroRegistry::default(),
            file_asts: Vec::new(),
            file_tokens: HashMap::new(),
            caches: PipelineCaches::default(),
            epoch: AtomicU64::new(0),
            stable: Arc::new(Notify::new()),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn upsert_file(&mut self, uri: Url, version: i32, text: String) {
        self.caches.invalidate(&uri);
        if let Some(existing) = self.files.iter_mut().find(|f| f.uri == uri) {
            existing.version = version;
            existing.text = text;
        } else {
            self.overlays.push(uri.clone());
            self.files.push(SourceFile { uri, version, text });
        }
    }

    pub fn file_text(&self, uri: &Url) -> Option<&str> {
        self.files.iter().find(|f| &f.uri == uri).map(|f| f.text.as_str())
    }

    pub fn ast_for(&self, uri: &Url) -> Option<&crate::parser::Ast> {
        self.file_asts.iter().find(|f| &f.uri == uri).map(|f| &f.ast)
    }

    pub fn tokens_for(&self, uri: &Url) -> Option<&[Token]> {
        self.file_tokens.get(uri).map(Vec::as_slice)
    }

    /// Reloads the binding library from the settings-configured roots, then
    /// re-parses every file in source order, merges, binds, and checks —
    /// the whole of `spec.md` §4.5 plus §4.6 attachment.
    pub fn rebuild(&mut self) {
        let loader = FsIncludeLoader {
            workspace_root: self.workspace_root.clone(),
            include_paths: self.settings.default_include_paths.clone(),
        };

        self.library = load_binding_library(self);

        let mut diagnostics = Vec::new();
        let mut file_asts = Vec::new();
        let mut file_tokens = HashMap::new();
        let mut macros = MacroRegistry::default();
        for file in &self.files {
            let path = uri_to_path(&file.uri).unwrap_or_else(|| PathBuf::from(file.uri.path()));
            let parsed = parse_file(&mut self.caches, &loader, &file.uri, &path, &file.text);
            diagnostics.extend(parsed.diagnostics);
            for def in parsed.macros.macros.into_values() {
                macros.define(def);
            }
            file_tokens.insert(file.uri.clone(), parsed.tokens);
            file_asts.push(FileAst { uri: file.uri.clone(), ast: parsed.ast });
        }

        let eval_out = evaluate(&file_asts);
        diagnostics.extend(eval_out.diagnostics);
        let mut tree = eval_out.tree;
        diagnostics.extend(apply_bindings(&mut tree, &self.library, &file_asts));

        self.tree = tree;
        self.diagnostics = diagnostics;
        self.macros = macros;
        self.file_asts = file_asts;
        self.file_tokens = file_tokens;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.stable.notify_waiters();
    }

    /// Awaits the next rebuild's completion (`spec.md` §5 "Query operations
    /// await parse stable... they never observe a half-built runtime
    /// tree"). Edge-triggered: callers that raced a rebuild that already
    /// happened should check `epoch()` before awaiting.
    pub async fn wait_stable(&self) {
        self.stable.notified().await;
    }
}

fn load_binding_library(ctx: &Context) -> BindingLibrary {
    use crate::config::BindingDialect;
    let roots: &[String] = match ctx.settings.default_binding_type {
        BindingDialect::Zephyr => &ctx.settings.zephyr_bindings,
        BindingDialect::DevicetreeOrg => &ctx.settings.device_org_tree_bindings,
        BindingDialect::None => &[],
    };
    let mut resolved_roots = Vec::new();
    for root in roots {
        let base = crate::utils::paths::resolve_config_path(ctx.workspace_root.as_deref(), root);
        if let Some(base) = base {
            resolved_roots.push(base);
        }
    }
    // Binding trees commonly nest by vendor directory; expand each
    // configured root to every directory that actually holds a `.yaml`
    // file so `BindingLibrary::load`'s flat per-root scan still finds them
    // (`spec.md` §6 "recursive glob on `**/*.yaml` excluding `test/*`").
    let mut expanded_roots = Vec::new();
    for root in &resolved_roots {
        expanded_roots.push(root.clone());
        for path in glob_binding_yaml_files(root) {
            if let Some(parent) = path.parent() {
                if !expanded_roots.contains(&parent.to_path_buf()) {
                    expanded_roots.push(parent.to_path_buf());
                }
            }
        }
    }

    let mut diagnostics = Vec::new();
    BindingLibrary::load(&expanded_roots, &mut diagnostics)
}

/// Owns every open context and which one is active (`spec.md` §4.4
/// operations). `DashMap` matches the concurrency contract in §5: contexts
/// may be rebuilt in parallel, but state within one context is never
/// shared with another in-flight evaluation.
pub struct ContextManager {
    contexts: DashMap<ContextId, Arc<RwLock<Context>>>,
    active: RwLock<Option<ContextId>>,
    next_id: AtomicU32,
    workspace_root: RwLock<Option<PathBuf>>,
}

impl ContextManager {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self {
            contexts: DashMap::new(),
            active: RwLock::new(None),
            next_id: AtomicU32::new(1),
            workspace_root: RwLock::new(workspace_root),
        }
    }

    /// Set once the `initialize` handshake reports workspace folders — the
    /// manager exists before that point since `tower_lsp` constructs the
    /// backend ahead of the first request.
    pub async fn set_workspace_root(&self, root: Option<PathBuf>) {
        *self.workspace_root.write().await = root;
    }

    pub async fn add_context(&self, name: String, main: Url, settings: DtsConfig) -> ContextId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let root = self.workspace_root.read().await.clone();
        let context = Context::new(id, name, main, root, settings);
        self.contexts.insert(id, Arc::new(RwLock::new(context)));
        if self.active.read().await.is_none() {
            *self.active.write().await = Some(id);
        }
        id
    }

    pub async fn remove_context(&self, id: ContextId) -> bool {
        let removed = self.contexts.remove(&id).is_some();
        if removed {
            let mut active = self.active.write().await;
            if *active == Some(id) {
                *active = self.contexts.iter().next().map(|e| *e.key());
            }
        }
        removed
    }

    pub async fn set_active(&self, id: ContextId) -> bool {
        if !self.contexts.contains_key(&id) {
            return false;
        }
        *self.active.write().await = Some(id);
        true
    }

    pub async fn active_context(&self) -> Option<Arc<RwLock<Context>>> {
        let id = (*self.active.read().await)?;
        self.contexts.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn get_context(&self, id: ContextId) -> Option<Arc<RwLock<Context>>> {
        self.contexts.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn get_contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.contexts.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Idempotent create-or-return: finds a context whose main source or
    /// overlays already include `uri`, else creates a new one with `uri`
    /// as its main source (`spec.md` §4.4 "requestContext").
    pub async fn request_context(&self, uri: &Url, settings: DtsConfig) -> ContextId {
        for entry in self.contexts.iter() {
            let ctx = entry.value().read().await;
            if ctx.files.iter().any(|f| &f.uri == uri) {
                return ctx.id;
            }
        }
        let name = uri
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("context")
            .to_string();
        self.add_context(name, uri.clone(), settings).await
    }

    pub fn context_for_file(&self, uri: &Url) -> Option<ContextId> {
        for entry in self.contexts.iter() {
            let id = *entry.key();
            if let Ok(ctx) = entry.value().try_read() {
                if ctx.files.iter().any(|f| &f.uri == uri) {
                    return Some(id);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;

    #[tokio::test]
    async fn request_context_is_idempotent() {
        let manager = ContextManager::new(None);
        let uri = Url::parse("file:///board.dts").unwrap();
        let first = manager.request_context(&uri, DtsConfig::default()).await;
        let second = manager.request_context(&uri, DtsConfig::default()).await;
        assert_eq!(first, second);
        assert_eq!(manager.get_contexts(), vec![first]);
    }

    #[tokio::test]
    async fn rebuild_after_edit_reports_duplicate_property() {
        let manager = ContextManager::new(None);
        let uri = Url::parse("file:///board.dts").unwrap();
        let id = manager.request_context(&uri, DtsConfig::default()).await;
        let handle = manager.get_context(id).unwrap();
        {
            let mut ctx = handle.write().await;
            ctx.upsert_file(uri.clone(), 1, "/{prop1;prop1;cpus{};memory{};};".to_string());
            ctx.rebuild();
        }
        let ctx = handle.read().await;
        assert!(ctx.diagnostics.iter().any(|d| d.kind == DiagnosticKind::DuplicatePropertyName));
    }

    #[tokio::test]
    async fn remove_context_reassigns_active() {
        let manager = ContextManager::new(None);
        let a = manager.add_context("a".into(), Url::parse("file:///a.dts").unwrap(), DtsConfig::default()).await;
        let b = manager.add_context("b".into(), Url::parse("file:///b.dts").unwrap(), DtsConfig::default()).await;
        manager.set_active(a).await;
        manager.remove_context(a).await;
        let active = manager.active_context().await.unwrap();
        assert_eq!(active.read().await.id, b);
    }
}
