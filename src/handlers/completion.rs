use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{CompletionParams, CompletionResponse};

use crate::backend::Backend;
use crate::query::completion::complete;

impl Backend {
    pub async fn handle_completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(Some(CompletionResponse::Array(Vec::new())));
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(Some(CompletionResponse::Array(Vec::new())));
        };
        let ctx = handle.read().await;
        Ok(Some(CompletionResponse::Array(complete(&ctx, &uri, pos))))
    }
}
