use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{SemanticTokensParams, SemanticTokensRangeParams, SemanticTokensRangeResult, SemanticTokensResult};

use crate::backend::Backend;
use crate::query::semantic_tokens::semantic_tokens;

impl Backend {
    pub async fn handle_semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = params.text_document.uri;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(None);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        Ok(semantic_tokens(&ctx, &uri).map(SemanticTokensResult::Tokens))
    }

    /// Full-document tokens are cheap enough (one lexer pass) that a
    /// dedicated range computation isn't worth the extra code; the client
    /// receives the whole set and discards what's out of view.
    pub async fn handle_semantic_tokens_range(
        &self,
        params: SemanticTokensRangeParams,
    ) -> Result<Option<SemanticTokensRangeResult>> {
        let uri = params.text_document.uri;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(None);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        Ok(semantic_tokens(&ctx, &uri).map(SemanticTokensRangeResult::Tokens))
    }
}
