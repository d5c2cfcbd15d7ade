use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{GotoDefinitionParams, GotoDefinitionResponse};

use crate::backend::Backend;
use crate::query::definition::definition;

impl Backend {
    pub async fn handle_goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(None);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        let locations = definition(&ctx, &uri, pos);
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }
}
