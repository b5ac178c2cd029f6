use crate::AppState;
use actix_web::{get, post, web, HttpResponse, Responder, Result as ActixResult};
use actix_ws::Message;
use chaincore::ChainError;
use chainruntime::WorkflowRequest;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

const ASSISTANT_MODEL: &str = "gpt-3.5-turbo";
const ASSISTANT_TIMEOUT: Duration = Duration::from_secs(60);

const ASSISTANT_PROMPT: &str = "\
You are a friendly assistant for a workflow automation tool. Your job is to:

1. Explain where to find nodes in the interface
2. Teach how to connect nodes to build workflows
3. Describe what each node does in simple terms
4. Answer general questions about the tool

Rules:
- Speak conversationally (no code/json)
- Never mention API keys or technical details
- If unsure, say \"I'll check with the team\"
";

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "working" }))
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "chainserver"
    }))
}

/// Run a node chain and return its final output
#[post("/query")]
async fn run_query(
    data: web::Data<AppState>,
    request: web::Json<WorkflowRequest>,
) -> ActixResult<impl Responder> {
    let request = request.into_inner();
    info!("Running chain {:?}", request.node_ids);

    match data.runtime.run_request(request).await {
        Ok(output) => Ok(HttpResponse::Ok().json(json!({ "result": output.to_json() }))),
        Err(ChainError::Validation(e)) => {
            warn!("Rejected chain: {}", e);
            Ok(HttpResponse::BadRequest().json(json!({ "detail": e.to_string() })))
        }
        Err(ChainError::Execution(e)) => {
            error!("Chain failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "detail": e.to_string(),
                "node_id": e.node_id(),
                "position": e.position(),
            })))
        }
    }
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let nodes: Vec<_> = registry
        .list_node_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type).unwrap_or_default();
            json!({
                "type": node_type,
                "description": metadata.description,
                "category": metadata.category,
                "params": metadata.params,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagged, skipped {} events", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_message: String,
}

/// Product assistant that explains how to use the tool
#[post("/chat")]
async fn chat(data: web::Data<AppState>, request: web::Json<ChatRequest>) -> ActixResult<impl Responder> {
    let Some(api_key) = data.config.openai_api_key.as_deref() else {
        return Ok(HttpResponse::ServiceUnavailable().json(json!({
            "detail": "Chat assistant is not configured"
        })));
    };

    let body = json!({
        "model": ASSISTANT_MODEL,
        "messages": [
            { "role": "system", "content": ASSISTANT_PROMPT },
            { "role": "user", "content": request.user_message },
        ],
        "temperature": 0.7,
    });

    match chainnodes::chat_completion(&data.config.openai_base_url, api_key, &body, ASSISTANT_TIMEOUT).await {
        Ok(reply) => Ok(HttpResponse::Ok().json(json!({ "reply": reply }))),
        Err(e) => {
            error!("Chat assistant failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({ "detail": e.to_string() })))
        }
    }
}
