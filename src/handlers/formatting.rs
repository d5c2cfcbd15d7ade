use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{DocumentFormattingParams, Position, Range, TextEdit};

use crate::backend::Backend;
use crate::query::formatting::{format_document, FormatOptions};

impl Backend {
    pub async fn handle_formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(None);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(None);
        };
        let ctx = handle.read().await;
        let Some(text) = ctx.file_text(&uri) else {
            return Ok(None);
        };

        let opts = params.options;
        let format_opts = FormatOptions {
            tab_size: opts.tab_size,
            insert_spaces: opts.insert_spaces,
            trim_trailing_whitespace: opts.trim_trailing_whitespace.unwrap_or(false),
        };
        let formatted = format_document(text, &format_opts);
        let last_line = text.lines().count().max(1) as u32;
        let whole_document = Range::new(Position::new(0, 0), Position::new(last_line, 0));
        Ok(Some(vec![TextEdit { range: whole_document, new_text: formatted }]))
    }
}
