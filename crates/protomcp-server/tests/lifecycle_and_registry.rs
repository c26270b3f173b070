//! End-to-end tests driving `DispatchCore` the way a transport adapter
//! would: full JSON-RPC frames in, frames or `None` out.

use std::sync::Arc;

use serde_json::json;

use protomcp_protocol::sampling::SamplingMessage;
use protomcp_protocol::{
    ClientCapabilities, Content, CreateMessageParams, ModelPreferences, Resource, ResourceKind, ResourceTemplate, Tool,
};
use protomcp_server::dispatch::DispatchCore;
use protomcp_server::handler::{OpaqueTool, ResourceHandler, ResourceTemplateHandler};
use protomcp_server::sampling::SamplingOptions;
use protomcp_server::transport::test_support::MemoryTransport;
use protomcp_server::ServerConfig;

fn init_frame(id: i64) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "clientInfo": {"name": "integration-test", "version": "1"},
            "capabilities": {"resources": {"subscribe": true}},
        }
    })
}

struct EchoResource;

#[async_trait::async_trait]
impl ResourceHandler for EchoResource {
    async fn read(&self, _ctx: protomcp_protocol::RequestContext) -> protomcp_server::ServerResult<serde_json::Value> {
        Ok(json!({"text": "static content"}))
    }
}

struct GreetingTemplate;

#[async_trait::async_trait]
impl ResourceTemplateHandler for GreetingTemplate {
    async fn read(
        &self,
        _ctx: protomcp_protocol::RequestContext,
        variables: std::collections::HashMap<String, String>,
    ) -> protomcp_server::ServerResult<serde_json::Value> {
        let name = variables.get("name").cloned().unwrap_or_default();
        Ok(json!({"text": format!("hello, {name}")}))
    }
}

#[tokio::test]
async fn tools_register_list_call_unregister_round_trip() {
    let core = DispatchCore::new(ServerConfig::default());
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;

    core.registry().register_tool(
        Tool::new("greet", "says hello"),
        Arc::new(OpaqueTool::new(|_ctx, args| async move {
            let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("world");
            Ok(json!(format!("hello, {name}!")))
        })),
    );

    let list = core
        .handle_frame(&session, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await
        .unwrap();
    let names: Vec<&str> = list["result"]["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["greet"]);

    let call = core
        .handle_frame(
            &session,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "greet", "arguments": {"name": "ada"}}}),
        )
        .await
        .unwrap();
    assert_eq!(call["result"]["isError"], false);
    assert_eq!(call["result"]["content"][0]["text"], "hello, ada!");

    assert!(core.registry().unregister_tool("greet"));
    let list_after = core
        .handle_frame(&session, json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"}))
        .await
        .unwrap();
    assert!(list_after["result"]["tools"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn static_resource_read_returns_handler_output() {
    let core = DispatchCore::new(ServerConfig::default());
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;

    core.registry()
        .register_resource(
            Resource {
                uri: "res://static/a".into(),
                name: "a".into(),
                description: None,
                kind: ResourceKind::Text,
                mime_type: None,
                tags: vec![],
                content_source: protomcp_protocol::resources::ContentSource::InlineText("hello".into()),
                metadata: Default::default(),
            },
            Arc::new(EchoResource),
            protomcp_protocol::DuplicatePolicy::Error,
        )
        .unwrap();

    let response = core
        .handle_frame(
            &session,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read", "params": {"uri": "res://static/a"}}),
        )
        .await
        .unwrap();
    assert_eq!(response["result"]["text"], "static content");
}

#[tokio::test]
async fn resource_template_read_binds_named_variables() {
    let core = DispatchCore::new(ServerConfig::default());
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;

    core.registry()
        .register_template(
            ResourceTemplate {
                pattern: "res://greet/{name}".into(),
                aliases: vec![],
                name: "greeting".into(),
                description: None,
                variables: vec![protomcp_protocol::resources::VariableBinding {
                    name: "name".into(),
                    wildcard: false,
                    default: None,
                }],
                duplicate_policy: protomcp_protocol::DuplicatePolicy::Error,
            },
            Arc::new(GreetingTemplate),
        )
        .unwrap();

    let response = core
        .handle_frame(
            &session,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read", "params": {"uri": "res://greet/ada"}}),
        )
        .await
        .unwrap();
    assert_eq!(response["result"]["text"], "hello, ada");
}

#[tokio::test]
async fn subscribe_then_unsubscribe_round_trip() {
    let core = DispatchCore::new(ServerConfig::default());
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;

    let subscribe = core
        .handle_frame(
            &session,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/subscribe", "params": {"uri": "res://a"}}),
        )
        .await
        .unwrap();
    assert!(subscribe["result"].is_object());
    assert!(core.subscriptions().is_subscribed("res://a", "s1"));

    core.handle_frame(
        &session,
        json!({"jsonrpc": "2.0", "id": 3, "method": "resources/unsubscribe", "params": {"uri": "res://a"}}),
    )
    .await;
    assert!(!core.subscriptions().is_subscribed("res://a", "s1"));
}

#[tokio::test]
async fn disconnect_unsubscribes_and_terminates() {
    let core = DispatchCore::new(ServerConfig::default());
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;
    core.handle_frame(
        &session,
        json!({"jsonrpc": "2.0", "id": 2, "method": "resources/subscribe", "params": {"uri": "res://a"}}),
    )
    .await;

    core.handle_disconnect("s1").await;
    assert!(!core.subscriptions().is_subscribed("res://a", "s1"));
    assert_eq!(core.session_state("s1"), protomcp_server::SessionState::Terminated);
}

#[tokio::test]
async fn sampling_round_trip_goes_through_real_ingest_response() {
    let core = Arc::new(DispatchCore::new(ServerConfig::default()));
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;
    session.store_client_capabilities(ClientCapabilities {
        sampling: protomcp_protocol::capabilities::SamplingCapability {
            text_support: true,
            image_support: false,
            audio_support: false,
        },
        ..Default::default()
    });
    let session = Arc::new(session);

    let responder = {
        let core = core.clone();
        let session = session.clone();
        tokio::spawn(async move {
            loop {
                tokio::task::yield_now().await;
                let frame = { session.sent.lock().last().cloned() };
                let Some(id) = frame.and_then(|f| f.get("id").and_then(|v| v.as_i64())) else {
                    continue;
                };
                // Drive the response through the same path a transport adapter
                // would: a full JSON-RPC envelope handed to `handle_frame`,
                // not a bare result handed straight to the tracker.
                let envelope = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"role": "assistant", "content": {"type": "text", "text": "hi"}},
                });
                core.handle_frame(session.as_ref(), envelope).await;
                break;
            }
        })
    };

    let params = CreateMessageParams {
        messages: vec![SamplingMessage {
            role: "user".into(),
            content: Content::text("hi"),
        }],
        model_preferences: ModelPreferences::default(),
        system_prompt: None,
        max_tokens: 128,
    };
    let result = core
        .sampling()
        .request_sampling(session.as_ref(), protomcp_protocol::ProtocolVersion::latest(), params, SamplingOptions::default())
        .await
        .unwrap();
    responder.await.unwrap();
    assert_eq!(result.role, "assistant");
}

#[tokio::test]
async fn sampling_remote_error_envelope_fails_without_retry() {
    let core = Arc::new(DispatchCore::new(ServerConfig::default()));
    let session = MemoryTransport::new("s1");
    core.handle_frame(&session, init_frame(1)).await;
    session.store_client_capabilities(ClientCapabilities {
        sampling: protomcp_protocol::capabilities::SamplingCapability {
            text_support: true,
            image_support: false,
            audio_support: false,
        },
        ..Default::default()
    });
    let session = Arc::new(session);

    let responder = {
        let core = core.clone();
        let session = session.clone();
        tokio::spawn(async move {
            loop {
                tokio::task::yield_now().await;
                let frame = { session.sent.lock().last().cloned() };
                let Some(id) = frame.and_then(|f| f.get("id").and_then(|v| v.as_i64())) else {
                    continue;
                };
                let envelope = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32001, "message": "client declined"},
                });
                core.handle_frame(session.as_ref(), envelope).await;
                break;
            }
        })
    };

    let params = CreateMessageParams {
        messages: vec![SamplingMessage {
            role: "user".into(),
            content: Content::text("hi"),
        }],
        model_preferences: ModelPreferences::default(),
        system_prompt: None,
        max_tokens: 128,
    };
    let result = core
        .sampling()
        .request_sampling(session.as_ref(), protomcp_protocol::ProtocolVersion::latest(), params, SamplingOptions::default())
        .await;
    responder.await.unwrap();
    assert!(result.is_err());
}
