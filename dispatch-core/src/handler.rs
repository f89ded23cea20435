//! [`Handler`] is a polymorphic capability with one operation. Two implementations are
//! provided: a JSON-RPC command table dispatcher and a bare closure for ad-hoc routes
//! (static assets, REST-style endpoints).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::request::ReplyGateway;

/// Per-worker resource, e.g. a database connection opened once inside the worker
/// thread. The core only ever sees it as an opaque handle; `R` is supplied by the host.
pub trait Handler: Send + Sync {
    fn exec(
        &self,
        path_tail: &str,
        method: crate::request::Method,
        headers: &[(String, String)],
        body: Vec<u8>,
        reply: ReplyGateway,
        worker_resource: &mut dyn std::any::Any,
    );
}

/// A JSON-RPC method table: `{"id", "method", "params"}` (or a batch array of such
/// objects) dispatched by `method` name to a registered function.
pub type CommandFn =
    Arc<dyn Fn(Value, &mut dyn std::any::Any) -> Result<Value, CommandError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CommandError {
    pub code: i64,
    pub message: String,
}

impl CommandError {
    pub fn not_found(method: &str) -> CommandError {
        CommandError {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> CommandError {
        CommandError {
            code: -32602,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> CommandError {
        CommandError {
            code: -32603,
            message: message.into(),
        }
    }
}

pub struct CommandTableHandler {
    commands: HashMap<String, CommandFn>,
}

impl Default for CommandTableHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTableHandler {
    pub fn new() -> Self {
        CommandTableHandler {
            commands: HashMap::new(),
        }
    }

    pub fn register(&mut self, method: impl Into<String>, f: CommandFn) -> &mut Self {
        self.commands.insert(method.into(), f);
        self
    }

    fn dispatch_one(&self, request: &Value, worker_resource: &mut dyn std::any::Any) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = match request.get("method").and_then(Value::as_str) {
            Some(m) => m,
            None => return jsonrpc_error(id, CommandError::invalid_params("missing method")),
        };
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        match self.commands.get(method) {
            Some(f) => match f(params, worker_resource) {
                Ok(result) => jsonrpc_success(id, result),
                Err(err) => jsonrpc_error(id, err),
            },
            None => jsonrpc_error(id, CommandError::not_found(method)),
        }
    }
}

fn jsonrpc_success(id: Value, result: Value) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn jsonrpc_error(id: Value, err: CommandError) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": err.code, "message": err.message },
    })
}

impl Handler for CommandTableHandler {
    fn exec(
        &self,
        _path_tail: &str,
        _method: crate::request::Method,
        _headers: &[(String, String)],
        body: Vec<u8>,
        reply: ReplyGateway,
        worker_resource: &mut dyn std::any::Any,
    ) {
        let parsed: Result<Value, _> = serde_json::from_slice(&body);
        let Ok(parsed) = parsed else {
            reply.write_reply(
                400,
                br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#
                    .to_vec(),
            );
            return;
        };

        let response = match &parsed {
            Value::Array(batch) => {
                let results: Vec<Value> = batch
                    .iter()
                    .map(|req| self.dispatch_one(req, worker_resource))
                    .collect();
                Value::Array(results)
            }
            Value::Object(_) => self.dispatch_one(&parsed, worker_resource),
            _ => {
                reply.write_reply(
                    400,
                    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32600,"message":"Invalid Request"}}"#
                        .to_vec(),
                );
                return;
            }
        };

        let body = serde_json::to_vec(&response).unwrap_or_default();
        reply.write_header("Content-Type", "application/json");
        reply.write_reply(200, body);
    }
}

/// An ad-hoc handler backed by a user-supplied closure — used for static assets, REST
/// endpoints, or anything that doesn't fit the JSON-RPC shape.
pub struct StaticHandler<F>
where
    F: Fn(&str, crate::request::Method, &[(String, String)], Vec<u8>, ReplyGateway, &mut dyn std::any::Any)
        + Send
        + Sync,
{
    f: F,
}

impl<F> StaticHandler<F>
where
    F: Fn(&str, crate::request::Method, &[(String, String)], Vec<u8>, ReplyGateway, &mut dyn std::any::Any)
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        StaticHandler { f }
    }
}

impl<F> Handler for StaticHandler<F>
where
    F: Fn(&str, crate::request::Method, &[(String, String)], Vec<u8>, ReplyGateway, &mut dyn std::any::Any)
        + Send
        + Sync,
{
    fn exec(
        &self,
        path_tail: &str,
        method: crate::request::Method,
        headers: &[(String, String)],
        body: Vec<u8>,
        reply: ReplyGateway,
        worker_resource: &mut dyn std::any::Any,
    ) {
        (self.f)(path_tail, method, headers, body, reply, worker_resource);
    }
}
