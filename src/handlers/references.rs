use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{Location, ReferenceParams};

use crate::backend::Backend;
use crate::query::references::references;

impl Backend {
    pub async fn handle_references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;
        let include_declaration = params.context.include_declaration;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(None);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        let locations = references(&ctx, &uri, pos, include_declaration);
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(locations))
    }
}
