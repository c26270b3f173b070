//! Handler traits and the typed argument-decoding wrapper (spec §4.5).
//!
//! JSON-schema generation from a handler's argument description is out of
//! scope for this core (spec §1) — callers supply an already-built schema
//! (or `None` for an opaque-bytes handler) at registration time. What *is*
//! in scope is the decode wrapper described by spec §4.5: case-insensitive
//! object keys, weak numeric/string/bool conversions, comma-split array
//! fields, and RFC-3339 time parsing.
//!
//! The teacher's reflective dispatch (inspecting a handler's function shape
//! at registration) does not translate to a statically typed target (spec
//! §9 design note). Instead, each tool registers a concrete `ToolHandler`
//! trait object; [`TypedTool`] is the builder that pairs a schema with a
//! strongly typed closure, decoding before invoking it (spec §9: "a builder
//! interface where the caller supplies both a parse function ... and a
//! typed handler").

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use protomcp_protocol::RequestContext;

use crate::error::{ServerError, ServerResult};

/// A tool's call handler, type-erased so heterogeneous tools can share one
/// registry. `raw_args` is the still-undecoded `arguments` value from
/// `tools/call`; implementations that want typed arguments decode it
/// themselves (see [`TypedTool`]).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Declared input schema. `None` means this handler wants the raw
    /// JSON value and no schema is synthesized for `tools/list`.
    fn input_schema(&self) -> Option<&Value> {
        None
    }

    /// Invoke the handler with the undecoded call arguments.
    async fn call(&self, ctx: RequestContext, raw_args: Value) -> ServerResult<Value>;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A [`ToolHandler`] built from a schema plus a closure over a typed,
/// `Deserialize`-able argument struct. Raw arguments are normalized
/// against `schema` and decoded into `A` before `func` runs.
pub struct TypedTool<A, F> {
    schema: Value,
    func: F,
    _marker: PhantomData<fn(A)>,
}

impl<A, F, Fut> TypedTool<A, F>
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(RequestContext, A) -> Fut + Send + Sync,
    Fut: Future<Output = ServerResult<Value>> + Send + 'static,
{
    /// Pair `schema` (a JSON Schema `{type: object, properties: {...}}`
    /// document) with `func`.
    pub fn new(schema: Value, func: F) -> Self {
        Self {
            schema,
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, F, Fut> ToolHandler for TypedTool<A, F>
where
    A: DeserializeOwned + Send + Sync + 'static,
    F: Fn(RequestContext, A) -> Fut + Send + Sync,
    Fut: Future<Output = ServerResult<Value>> + Send + 'static,
{
    fn input_schema(&self) -> Option<&Value> {
        Some(&self.schema)
    }

    async fn call(&self, ctx: RequestContext, raw_args: Value) -> ServerResult<Value> {
        let args: A = decode_args(&self.schema, &raw_args)?;
        (self.func)(ctx, args).await
    }
}

/// A [`ToolHandler`] that wants the raw JSON value with no schema and no
/// decode step — spec §4.5's "opaque bytes" path.
pub struct OpaqueTool<F> {
    func: F,
}

impl<F, Fut> OpaqueTool<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ServerResult<Value>> + Send + 'static,
{
    /// Wrap a closure that accepts the raw call arguments.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for OpaqueTool<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ServerResult<Value>> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext, raw_args: Value) -> ServerResult<Value> {
        (self.func)(ctx, raw_args).await
    }
}

/// A static resource's read handler.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Produce the resource's content.
    async fn read(&self, ctx: RequestContext) -> ServerResult<Value>;
}

/// A resource template's read handler, bound with the variables matched
/// out of the incoming URI by [`crate::uri_template`].
///
/// Per spec §9's open question, the teacher's positional
/// variable-to-parameter binding is fragile; this core resolves it with
/// explicit named binding instead (the spec's own suggested fix) — the
/// handler receives a name-keyed map rather than a positional argument list.
#[async_trait]
pub trait ResourceTemplateHandler: Send + Sync {
    /// Produce content for the template instance bound by `variables`.
    async fn read(&self, ctx: RequestContext, variables: HashMap<String, String>) -> ServerResult<Value>;
}

/// A prompt's get handler.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Produce the prompt's rendered messages.
    async fn get(&self, ctx: RequestContext, arguments: Option<Value>) -> ServerResult<Value>;
}

/// Normalize `raw` against `schema` and deserialize into `T` (spec §4.5).
pub fn decode_args<T: DeserializeOwned>(schema: &Value, raw: &Value) -> ServerResult<T> {
    let normalized = normalize(schema, raw)?;
    serde_json::from_value(normalized)
        .map_err(|e| ServerError::Protocol(protomcp_core::Error::InvalidParams(e.to_string())))
}

fn normalize(schema: &Value, raw: &Value) -> ServerResult<Value> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(raw.clone());
    };
    let raw_obj = raw.as_object().ok_or_else(|| {
        ServerError::Protocol(protomcp_core::Error::InvalidParams(
            "tool arguments must be a JSON object".into(),
        ))
    })?;

    let mut lower_lookup: HashMap<String, &Value> = HashMap::with_capacity(raw_obj.len());
    for (k, v) in raw_obj {
        lower_lookup.insert(k.to_ascii_lowercase(), v);
    }

    let mut normalized = Map::new();
    for (prop_name, prop_schema) in properties {
        let Some(value) = lower_lookup.get(&prop_name.to_ascii_lowercase()) else {
            continue;
        };
        let expected_type = prop_schema.get("type").and_then(Value::as_str);
        normalized.insert(prop_name.clone(), coerce(value, expected_type));
    }
    // Fields the schema didn't declare pass through untouched, preserving
    // their original key, for handlers whose argument struct flattens extras.
    for (k, v) in raw_obj {
        if !properties.contains_key(k) && !normalized.contains_key(k) {
            normalized.insert(k.clone(), v.clone());
        }
    }
    Ok(Value::Object(normalized))
}

fn coerce(value: &Value, expected_type: Option<&str>) -> Value {
    match (expected_type, value) {
        (Some("integer"), Value::String(s)) => {
            s.trim().parse::<i64>().map(Value::from).unwrap_or_else(|_| value.clone())
        }
        (Some("number"), Value::String(s)) => {
            s.trim().parse::<f64>().map(Value::from).unwrap_or_else(|_| value.clone())
        }
        (Some("boolean"), Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => value.clone(),
        },
        (Some("boolean"), Value::Number(n)) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
        (Some("string"), Value::Number(n)) => Value::String(n.to_string()),
        (Some("string"), Value::Bool(b)) => Value::String(b.to_string()),
        (Some("array"), Value::String(s)) => {
            Value::Array(s.split(',').map(|part| Value::String(part.trim().to_string())).collect())
        }
        _ => value.clone(),
    }
}
