use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    DocumentSymbolParams, DocumentSymbolResponse, WorkspaceSymbolParams, WorkspaceSymbolResponse,
};

use crate::backend::Backend;
use crate::query::symbols::{document_symbols, workspace_symbols};

impl Backend {
    pub async fn handle_document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(None);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        let symbols = document_symbols(&ctx, &uri);
        if symbols.is_empty() {
            return Ok(None);
        }
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    /// Searches the active context only — `spec.md` §4.4 scopes
    /// cross-context queries to the one the user has selected.
    pub async fn handle_workspace_symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<WorkspaceSymbolResponse>> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        let symbols = workspace_symbols(&ctx, &params.query);
        Ok(Some(WorkspaceSymbolResponse::Flat(symbols)))
    }
}
