//! Custom JSON-RPC surface (`spec.md` §6): editor-integration requests and
//! notifications beyond the base LSP methods, registered with
//! `LspServiceBuilder::custom_method` in `main.rs`. Params/results are
//! `serde_json::Value` since each request's shape is editor-defined rather
//! than LSP-standard; handlers pick out the fields they need by hand.

use serde_json::{json, Value};
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::Url;

use crate::backend::Backend;
use crate::config::DtsConfig;
use crate::context::ContextId;

fn bad_params(msg: impl Into<String>) -> Error {
    Error::invalid_params(msg.into())
}

fn str_field<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    params.get(name).and_then(Value::as_str).ok_or_else(|| bad_params(format!("missing `{name}`")))
}

fn uri_field(params: &Value, name: &str) -> Result<Url> {
    Url::parse(str_field(params, name)?).map_err(|e| bad_params(e.to_string()))
}

impl Backend {
    pub async fn handle_set_default_settings(&self, params: Value) -> Result<Value> {
        let settings: DtsConfig = serde_json::from_value(params).map_err(|e| bad_params(e.to_string()))?;
        *self.config.lock().await = settings;
        Ok(Value::Null)
    }

    pub async fn handle_get_contexts(&self, _params: Value) -> Result<Value> {
        Ok(json!(self.contexts.get_contexts()))
    }

    pub async fn handle_set_active(&self, params: Value) -> Result<Value> {
        let id = params.get("id").and_then(Value::as_u64).ok_or_else(|| bad_params("missing `id`"))? as ContextId;
        let ok = self.contexts.set_active(id).await;
        if ok {
            self.notify_new_active_context(id).await;
        }
        Ok(json!(ok))
    }

    pub async fn handle_get_active_context(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(Value::Null);
        };
        let ctx = handle.read().await;
        Ok(json!({ "id": ctx.id, "name": ctx.name, "main": ctx.main.to_string() }))
    }

    pub async fn handle_request_context(&self, params: Value) -> Result<Value> {
        let uri = uri_field(&params, "uri")?;
        let settings = self.config.lock().await.clone();
        let existing = self.contexts.context_for_file(&uri);
        let id = self.contexts.request_context(&uri, settings).await;
        if existing.is_none() {
            self.notify_context_created(id).await;
        }
        Ok(json!(id))
    }

    pub async fn handle_remove_context(&self, params: Value) -> Result<Value> {
        let id = params.get("id").and_then(Value::as_u64).ok_or_else(|| bad_params("missing `id`"))? as ContextId;
        let removed = self.contexts.remove_context(id).await;
        if removed {
            self.notify_context_deleted(id).await;
        }
        Ok(json!(removed))
    }

    /// Renders the active context's merged tree back to DTS source text —
    /// a debugging aid for seeing what the preprocessor/evaluator produced.
    pub async fn handle_compiled_dts_output(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(Value::Null);
        };
        let ctx = handle.read().await;
        Ok(json!(crate::query::dump::render_tree(&ctx.tree)))
    }

    pub async fn handle_serialized_context(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(Value::Null);
        };
        let ctx = handle.read().await;
        Ok(json!({
            "id": ctx.id,
            "name": ctx.name,
            "main": ctx.main.to_string(),
            "overlays": ctx.overlays.iter().map(Url::to_string).collect::<Vec<_>>(),
            "diagnosticCount": ctx.diagnostics.len(),
            "nodeCount": ctx.tree.nodes.len(),
        }))
    }

    pub async fn handle_active_path(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(Value::Null);
        };
        let ctx = handle.read().await;
        Ok(json!(ctx.workspace_root.as_ref().map(|p| p.display().to_string())))
    }

    /// Editor-defined command palette actions; this server doesn't
    /// contribute any of its own yet.
    pub async fn handle_custom_actions(&self, _params: Value) -> Result<Value> {
        Ok(json!([]))
    }

    pub async fn handle_active_file_uri(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(Value::Null);
        };
        let ctx = handle.read().await;
        Ok(json!(ctx.main.to_string()))
    }

    /// Evaluates every macro invocation recorded for the file, returning
    /// `{name, callSite, paramCount}` per invocation site (`spec.md` §4.2).
    pub async fn handle_eval_macros(&self, params: Value) -> Result<Value> {
        let uri = uri_field(&params, "uri")?;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(json!([]));
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(json!([]));
        };
        let ctx = handle.read().await;
        let macros: Vec<Value> = ctx
            .macros
            .macros
            .values()
            .map(|def| {
                json!({
                    "name": def.name,
                    "functionLike": def.is_function_like(),
                    "invoked": def.invoked,
                    "callSites": def.call_sites.len(),
                })
            })
            .collect();
        Ok(json!(macros))
    }

    /// Per-node memory-layout summary (address/size from `reg`), used by
    /// editor memory-map views.
    pub async fn handle_memory_views(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(json!([]));
        };
        let ctx = handle.read().await;
        let views: Vec<Value> = ctx
            .tree
            .nodes
            .iter()
            .filter(|n| n.properties.contains_key("reg"))
            .map(|n| json!({ "path": n.path.join("/"), "address": n.address }))
            .collect();
        Ok(json!(views))
    }

    pub async fn handle_zephyr_type_bindings(&self, _params: Value) -> Result<Value> {
        let Some(handle) = self.contexts.active_context().await else {
            return Ok(json!([]));
        };
        let ctx = handle.read().await;
        let names: Vec<String> = ctx
            .tree
            .nodes
            .iter()
            .filter_map(|n| n.node_type.as_ref().map(|t| t.name.clone()))
            .collect();
        Ok(json!(names))
    }

    pub async fn handle_context_macro_names(&self, params: Value) -> Result<Value> {
        let uri = uri_field(&params, "uri")?;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(json!([]));
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(json!([]));
        };
        let ctx = handle.read().await;
        Ok(json!(ctx.macros.names()))
    }

    /// Describes what scope (node path, property, or none) a position falls
    /// within — the same resolution completion/hover use, exposed raw.
    pub async fn handle_location_scope_information(&self, params: Value) -> Result<Value> {
        let uri = uri_field(&params, "uri")?;
        let position: tower_lsp::lsp_types::Position =
            serde_json::from_value(params.get("position").cloned().unwrap_or(Value::Null))
                .map_err(|e| bad_params(e.to_string()))?;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(Value::Null);
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(Value::Null);
        };
        let ctx = handle.read().await;
        let Some(ast) = ctx.ast_for(&uri) else {
            return Ok(Value::Null);
        };
        let chain = crate::query::cursor::ancestor_chain(ast, position);
        let node_ref = crate::query::cursor::enclosing_runtime_node(&ctx.tree, &uri, &chain);
        let property = crate::query::cursor::enclosing_property(ast, &chain).map(|(name, _)| name);
        Ok(json!({
            "nodePath": node_ref.map(|r| ctx.tree.get(r).path.join("/")),
            "property": property,
        }))
    }

    pub async fn handle_format_text_edits(&self, params: Value) -> Result<Value> {
        let uri = uri_field(&params, "uri")?;
        let Some(id) = self.contexts.context_for_file(&uri) else {
            return Ok(json!([]));
        };
        let Some(handle) = self.contexts.get_context(id) else {
            return Ok(json!([]));
        };
        let ctx = handle.read().await;
        let Some(text) = ctx.file_text(&uri) else {
            return Ok(json!([]));
        };
        let opts = crate::query::formatting::FormatOptions::default();
        let formatted = crate::query::formatting::format_document(text, &opts);
        Ok(json!([{ "newText": formatted }]))
    }

    pub async fn notify_context_created(&self, id: ContextId) {
        self.client.send_notification::<ContextCreated>(json!({ "id": id })).await;
    }

    pub async fn notify_context_deleted(&self, id: ContextId) {
        self.client.send_notification::<ContextDeleted>(json!({ "id": id })).await;
    }

    pub async fn notify_new_active_context(&self, id: ContextId) {
        self.client.send_notification::<NewActiveContext>(json!({ "id": id })).await;
    }

    pub async fn notify_context_stable(&self, id: ContextId) {
        self.client.send_notification::<ContextStable>(json!({ "id": id })).await;
    }

    pub async fn notify_active_context_stable(&self, id: ContextId) {
        self.client.send_notification::<ActiveContextStable>(json!({ "id": id })).await;
    }

    pub async fn notify_settings_changed(&self) {
        self.client.send_notification::<SettingsChanged>(json!({})).await;
    }
}

macro_rules! custom_notification {
    ($name:ident, $method:literal) => {
        enum $name {}
        impl Notification for $name {
            type Params = Value;
            const METHOD: &'static str = $method;
        }
    };
}

custom_notification!(ContextCreated, "dts/contextCreated");
custom_notification!(ContextDeleted, "dts/contextDeleted");
custom_notification!(NewActiveContext, "dts/newActiveContext");
custom_notification!(ContextStable, "dts/contextStable");
custom_notification!(ActiveContextStable, "dts/activeContextStable");
custom_notification!(SettingsChanged, "dts/settingsChanged");
