mod backend;
mod bindings;
mod config;
mod context;
mod diagnostics;
mod handlers;
mod lexer;
mod parser;
mod preprocessor;
mod query;
mod runtime;
mod utils;

use tower_lsp::{LspService, Server};

use backend::Backend;

#[tokio::main]
async fn main() {
    env_logger::init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method("dts/setDefaultSettings", Backend::handle_set_default_settings)
        .custom_method("dts/getContexts", Backend::handle_get_contexts)
        .custom_method("dts/setActive", Backend::handle_set_active)
        .custom_method("dts/getActiveContext", Backend::handle_get_active_context)
        .custom_method("dts/requestContext", Backend::handle_request_context)
        .custom_method("dts/removeContext", Backend::handle_remove_context)
        .custom_method("dts/compiledDtsOutput", Backend::handle_compiled_dts_output)
        .custom_method("dts/serializedContext", Backend::handle_serialized_context)
        .custom_method("dts/activePath", Backend::handle_active_path)
        .custom_method("dts/customActions", Backend::handle_custom_actions)
        .custom_method("dts/activeFileUri", Backend::handle_active_file_uri)
        .custom_method("dts/evalMacros", Backend::handle_eval_macros)
        .custom_method("dts/memoryViews", Backend::handle_memory_views)
        .custom_method("dts/zephyrTypeBindings", Backend::handle_zephyr_type_bindings)
        .custom_method("dts/contextMacroNames", Backend::handle_context_macro_names)
        .custom_method("dts/locationScopeInformation", Backend::handle_location_scope_information)
        .custom_method("dts/formatTextEdits", Backend::handle_format_text_edits)
        .finish();

    Server::new(stdin, stdout, socket).serve(service).await;
}
