//! Document lifecycle (`spec.md` §4.4, §5 "Ordering guarantees"): every
//! open/change/close request finds (or creates) the file's context,
//! rebuilds it, and republishes diagnostics for every file the rebuild
//! touched — not just the file that changed, since a context spans many
//! files and an edit in one can surface or clear a diagnostic in another.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    Diagnostic, DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, Url,
};

use crate::backend::Backend;
use crate::context::{Context, ContextId};

impl Backend {
    pub async fn handle_did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let settings = self.config.lock().await.clone();
        let id = self.contexts.request_context(&uri, settings).await;
        let Some(handle) = self.contexts.get_context(id) else { return };
        {
            let mut ctx = handle.write().await;
            ctx.upsert_file(uri.clone(), params.text_document.version, params.text_document.text);
            ctx.rebuild();
        }
        self.publish_for_context(&handle).await;
        self.notify_stable(id).await;
    }

    pub async fn handle_did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let Some(id) = self.contexts.context_for_file(&uri) else { return };
        let Some(handle) = self.contexts.get_context(id) else { return };
        let mut rebuilt = false;
        {
            let mut ctx = handle.write().await;
            // Full sync (`ServerCapabilities::text_document_sync`): the
            // last content-change event carries the whole document text.
            if let Some(change) = params.content_changes.into_iter().last() {
                ctx.upsert_file(uri, params.text_document.version, change.text);
                ctx.rebuild();
                rebuilt = true;
            }
        }
        self.publish_for_context(&handle).await;
        if rebuilt {
            self.notify_stable(id).await;
        }
    }

    pub async fn handle_did_save(&self, _params: DidSaveTextDocumentParams) {}

    pub async fn handle_did_close(&self, _params: DidCloseTextDocumentParams) {}

    /// Groups the context's diagnostics by file (falling back to the main
    /// source for any diagnostic that never got tagged) and publishes one
    /// `publish_diagnostics` notification per file.
    async fn publish_for_context(&self, handle: &std::sync::Arc<tokio::sync::RwLock<Context>>) {
        let ctx = handle.read().await;
        let mut by_file: HashMap<Url, Vec<Diagnostic>> = HashMap::new();
        for file in &ctx.files {
            by_file.entry(file.uri.clone()).or_default();
        }
        for diagnostic in &ctx.diagnostics {
            let file = diagnostic.file.clone().unwrap_or_else(|| ctx.main.clone());
            by_file.entry(file).or_default().push(diagnostic.clone().into_lsp());
        }
        for (uri, diagnostics) in by_file {
            self.client.publish_diagnostics(uri, diagnostics, None).await;
        }
    }

    /// `spec.md` §4.4 "Stability events ... fire after every rebuild
    /// settles": every rebuilt context emits `contextStable`, and the
    /// currently active one additionally emits `activeContextStable`.
    async fn notify_stable(&self, id: ContextId) {
        self.notify_context_stable(id).await;
        let is_active = self.contexts.active_context().await.is_some_and(|handle| {
            handle.try_read().map(|ctx| ctx.id == id).unwrap_or(false)
        });
        if is_active {
            self.notify_active_context_stable(id).await;
        }
    }
}
