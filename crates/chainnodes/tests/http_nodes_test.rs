//! Vendor nodes against a local actix server standing in for each API.

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use chaincore::{ApiKeys, Node, NodeContext, NodeError, NodeParams, NodeParamsMap, State, Value};
use chainnodes::{
    ClaudeNode, GeminiAdvancedNode, GeminiNode, HashnodeNode, OpenAiAdvancedNode, OpenAiNode, SlackNode,
    VideoSummaryNode, WebhookNode, WhatsAppNode,
};
use serde_json::json;
use std::collections::HashMap;

const GOOD_KEY: &str = "good-key";

async fn serve(routes: fn(&mut web::ServiceConfig)) -> String {
    let server = HttpServer::new(move || App::new().configure(routes))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{}", addr)
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> &'a str {
    req.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "error": { "message": message } }))
}

fn new_state(query: &str, keys: ApiKeys) -> State {
    State::new(query, keys, NodeParamsMap::new())
}

fn ctx(node_id: &str, params: NodeParams) -> NodeContext {
    NodeContext::standalone(node_id, params)
}

fn failure_message(err: NodeError) -> String {
    match err {
        NodeError::ExecutionFailed(message) => message,
        other => panic!("unexpected error: {:?}", other),
    }
}

// OpenAI

async fn chat_completions(req: HttpRequest, body: web::Json<serde_json::Value>) -> HttpResponse {
    if header(&req, "authorization") != format!("Bearer {}", GOOD_KEY) {
        return unauthorized("Incorrect API key provided");
    }
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let last = messages.last().and_then(|m| m["content"].as_str()).unwrap_or_default();
    HttpResponse::Ok().json(json!({
        "choices": [{ "message": {
            "role": "assistant",
            "content": format!("{} says {} ({} messages)", body["model"].as_str().unwrap_or("?"), last, messages.len()),
        }}]
    }))
}

fn openai_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/v1/chat/completions", web::post().to(chat_completions));
}

#[actix_web::test]
async fn test_openai_answers_query() {
    let base = serve(openai_routes).await;
    let node = OpenAiNode::new().with_base_url(format!("{}/v1", base));
    let mut state = new_state("hello", ApiKeys::new().with("openai", GOOD_KEY));

    node.execute(&ctx("openai", NodeParams::new()), &mut state).await.unwrap();
    assert_eq!(
        state.current_output,
        Some(Value::from("gpt-4.1-mini says hello (1 messages)"))
    );
}

#[actix_web::test]
async fn test_openai_reports_vendor_error() {
    let base = serve(openai_routes).await;
    let node = OpenAiNode::new().with_base_url(format!("{}/v1", base));
    let mut state = new_state("hello", ApiKeys::new().with("openai", "wrong"));

    let err = node.execute(&ctx("openai", NodeParams::new()), &mut state).await.unwrap_err();
    assert_eq!(
        failure_message(err),
        "OpenAI returned HTTP 401: Incorrect API key provided"
    );
    assert!(state.current_output.is_none());
}

#[actix_web::test]
async fn test_openai_advanced_sends_prompt_parts() {
    let base = serve(openai_routes).await;
    let node = OpenAiAdvancedNode::new().with_base_url(format!("{}/v1", base));
    let params = NodeParams::new()
        .with("model", "gpt-4o")
        .with("system_instruction", "Be brief")
        .with("user_prompt", "override");
    let mut state = new_state("ignored", ApiKeys::new().with("openai", GOOD_KEY));

    node.execute(&ctx("openai/advanced", params), &mut state).await.unwrap();
    assert_eq!(state.current_output, Some(Value::from("gpt-4o says override (2 messages)")));
    assert_eq!(
        state.extras.get("llm_metadata").and_then(|m| m.get("model")),
        Some(&Value::from("gpt-4o"))
    );
    assert!(state.error.is_none());
}

#[actix_web::test]
async fn test_openai_advanced_records_vendor_error() {
    let base = serve(openai_routes).await;
    let node = OpenAiAdvancedNode::new().with_base_url(format!("{}/v1", base));
    let mut state = new_state("hi", ApiKeys::new().with("openai", "wrong"));

    assert!(node
        .execute(&ctx("openai/advanced", NodeParams::new()), &mut state)
        .await
        .is_err());
    let recorded = state.error.unwrap();
    assert!(recorded.starts_with("OpenAI Error"));
    assert!(recorded.contains("Incorrect API key provided"));
}

// Gemini

async fn generate_content(
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    if query.get("key").map(String::as_str) != Some(GOOD_KEY) {
        return HttpResponse::BadRequest().json(json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key." }
        }));
    }
    let model = path.into_inner();
    let prompt = body.pointer("/contents/0/parts/0/text").and_then(|t| t.as_str()).unwrap_or_default();
    HttpResponse::Ok().json(json!({
        "candidates": [{ "content": { "parts": [
            { "text": format!("{}: ", model.trim_end_matches(":generateContent")) },
            { "text": prompt },
        ]}}],
        "usageMetadata": { "totalTokenCount": 12 },
    }))
}

fn gemini_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/models/{model}", web::post().to(generate_content));
}

#[actix_web::test]
async fn test_gemini_joins_candidate_parts() {
    let base = serve(gemini_routes).await;
    let node = GeminiNode::new().with_base_url(&base);
    let mut state = new_state("why rust?", ApiKeys::new().with("gemini", GOOD_KEY));

    node.execute(&ctx("gemini", NodeParams::new()), &mut state).await.unwrap();
    assert_eq!(state.current_output, Some(Value::from("gemini-2.5-flash: why rust?")));
}

#[actix_web::test]
async fn test_gemini_reports_vendor_error() {
    let base = serve(gemini_routes).await;
    let node = GeminiNode::new().with_base_url(&base);
    let mut state = new_state("why rust?", ApiKeys::new().with("gemini", "wrong"));

    let err = node.execute(&ctx("gemini", NodeParams::new()), &mut state).await.unwrap_err();
    assert!(failure_message(err).contains("API key not valid"));
}

#[actix_web::test]
async fn test_gemini_advanced_records_usage() {
    let base = serve(gemini_routes).await;
    let node = GeminiAdvancedNode::new().with_base_url(&base);
    let params = NodeParams::new()
        .with("model", "gemini-1.5-pro")
        .with("context", "systems languages");
    let mut state = new_state("why rust?", ApiKeys::new().with("gemini", GOOD_KEY));

    node.execute(&ctx("gemini/advanced", params), &mut state).await.unwrap();
    assert_eq!(
        state.current_output,
        Some(Value::from(
            "gemini-1.5-pro: Context: systems languages\n\nQuestion: why rust?"
        ))
    );
    let metadata = state.extras.get("llm_metadata").unwrap();
    assert_eq!(
        metadata.get("usage").and_then(|u| u.get("totalTokenCount")),
        Some(&Value::from(12i64))
    );
}

#[actix_web::test]
async fn test_gemini_advanced_records_vendor_error() {
    let base = serve(gemini_routes).await;
    let node = GeminiAdvancedNode::new().with_base_url(&base);
    let mut state = new_state("why rust?", ApiKeys::new().with("gemini", "wrong"));

    assert!(node
        .execute(&ctx("gemini/advanced", NodeParams::new()), &mut state)
        .await
        .is_err());
    assert!(state.error.unwrap().starts_with("Gemini API error"));
}

// Anthropic

async fn messages(req: HttpRequest, body: web::Json<serde_json::Value>) -> HttpResponse {
    if header(&req, "x-api-key") != GOOD_KEY {
        return HttpResponse::Unauthorized().json(json!({
            "type": "error",
            "error": { "type": "authentication_error", "message": "invalid x-api-key" }
        }));
    }
    assert_eq!(header(&req, "anthropic-version"), "2023-06-01");
    HttpResponse::Ok().json(json!({
        "content": [{
            "type": "text",
            "text": format!("{} tokens: {}", body["max_tokens"], body["messages"][0]["content"].as_str().unwrap_or_default()),
        }]
    }))
}

fn anthropic_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/v1/messages", web::post().to(messages));
}

#[actix_web::test]
async fn test_claude_answers_query() {
    let base = serve(anthropic_routes).await;
    let node = ClaudeNode::new().with_base_url(format!("{}/v1", base));
    let mut state = new_state("hello", ApiKeys::new().with("anthropic", GOOD_KEY));

    node.execute(&ctx("claude", NodeParams::new().with("max_tokens", 64u64)), &mut state)
        .await
        .unwrap();
    assert_eq!(state.current_output, Some(Value::from("64 tokens: hello")));
}

#[actix_web::test]
async fn test_claude_reports_vendor_error() {
    let base = serve(anthropic_routes).await;
    let node = ClaudeNode::new().with_base_url(format!("{}/v1", base));
    let mut state = new_state("hello", ApiKeys::new().with("anthropic", "wrong"));

    let err = node.execute(&ctx("claude", NodeParams::new()), &mut state).await.unwrap_err();
    assert_eq!(failure_message(err), "Anthropic returned HTTP 401: invalid x-api-key");
}

// Hashnode

async fn graphql(req: HttpRequest, body: web::Json<serde_json::Value>) -> HttpResponse {
    let input = &body["variables"]["input"];
    if header(&req, "authorization") != GOOD_KEY {
        return HttpResponse::Ok().json(json!({
            "errors": [{ "message": "You are not authenticated." }]
        }));
    }
    assert_eq!(input["publicationId"], "pub-1");
    HttpResponse::Ok().json(json!({
        "data": { "createDraft": { "draft": { "id": "d-42", "title": input["title"] } } }
    }))
}

fn hashnode_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::post().to(graphql));
}

fn hashnode_keys(token: &str) -> ApiKeys {
    ApiKeys::new()
        .with("hashnode_token", token)
        .with("hashnode_publication_id", "pub-1")
}

#[actix_web::test]
async fn test_hashnode_creates_draft() {
    let base = serve(hashnode_routes).await;
    let node = HashnodeNode::new().with_endpoint(format!("{}/", base));
    let mut state = new_state("q", hashnode_keys(GOOD_KEY));
    state.set_output("# Post body");

    node.execute(&ctx("hashnode", NodeParams::new().with("title", "Launch notes")), &mut state)
        .await
        .unwrap();
    assert_eq!(
        state.current_output,
        Some(Value::from(
            "Draft 'Launch notes' created successfully on Hashnode with ID: d-42"
        ))
    );
}

#[actix_web::test]
async fn test_hashnode_reports_graphql_errors() {
    let base = serve(hashnode_routes).await;
    let node = HashnodeNode::new().with_endpoint(format!("{}/", base));
    let mut state = new_state("q", hashnode_keys("wrong"));
    state.set_output("# Post body");

    let err = node.execute(&ctx("hashnode", NodeParams::new()), &mut state).await.unwrap_err();
    let message = failure_message(err);
    assert!(message.starts_with("Hashnode GraphQL error"));
    assert!(message.contains("You are not authenticated."));
}

// Webhook

async fn hook(body: web::Json<serde_json::Value>) -> HttpResponse {
    assert_eq!(body["metadata"]["workflow_id"], "wf-9");
    match body["output"].as_str() {
        Some("ok") => HttpResponse::NoContent().finish(),
        _ => HttpResponse::InternalServerError().json(json!({ "message": "receiver crashed" })),
    }
}

fn webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/hook", web::post().to(hook));
}

#[actix_web::test]
async fn test_webhook_posts_output() {
    let base = serve(webhook_routes).await;
    let url = format!("{}/hook", base);
    let mut state = new_state("q", ApiKeys::new().with("webhook_url", url.as_str())).with_workflow_id("wf-9");
    state.set_output("ok");

    WebhookNode::new()
        .execute(&ctx("webhook", NodeParams::new()), &mut state)
        .await
        .unwrap();
    assert_eq!(state.current_output, Some(Value::from(format!("Webhook sent to {}", url))));
}

#[actix_web::test]
async fn test_webhook_reports_receiver_failure() {
    let base = serve(webhook_routes).await;
    let url = format!("{}/hook", base);
    let mut state = new_state("q", ApiKeys::new().with("webhook_url", url.as_str())).with_workflow_id("wf-9");
    state.set_output("boom");

    let err = WebhookNode::new()
        .execute(&ctx("webhook", NodeParams::new()), &mut state)
        .await
        .unwrap_err();
    let message = failure_message(err);
    assert!(message.starts_with("Webhook failed"));
    assert!(message.contains("HTTP 500: receiver crashed"));
}

// Twilio

async fn twilio_messages(
    path: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
) -> HttpResponse {
    if path.into_inner() != "AC1" {
        return HttpResponse::NotFound().json(json!({ "code": 20404, "message": "The requested resource was not found" }));
    }
    assert_eq!(form.get("To").map(String::as_str), Some("whatsapp:+15550001"));
    assert_eq!(form.get("From").map(String::as_str), Some("whatsapp:+15559999"));
    HttpResponse::Created().json(json!({ "sid": "SM1", "status": "queued", "body": form.get("Body") }))
}

fn twilio_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/Accounts/{sid}/Messages.json", web::post().to(twilio_messages));
}

fn twilio_keys(sid: &str) -> ApiKeys {
    ApiKeys::new()
        .with("twilio_sid", sid)
        .with("twilio_token", "token")
        .with("twilio_whatsapp_from", "+15559999")
}

#[actix_web::test]
async fn test_whatsapp_records_delivery_status() {
    let base = serve(twilio_routes).await;
    let node = WhatsAppNode::new().with_base_url(&base);
    let mut state = new_state("q", twilio_keys("AC1"));
    state.set_output("report ready");

    node.execute(&ctx("whatsapp", NodeParams::new().with("to_number", "+15550001")), &mut state)
        .await
        .unwrap();
    assert_eq!(state.extras.get("whatsapp_status"), Some(&Value::from("queued")));
    assert_eq!(state.current_output, Some(Value::from("report ready")));
}

#[actix_web::test]
async fn test_whatsapp_reports_vendor_error() {
    let base = serve(twilio_routes).await;
    let node = WhatsAppNode::new().with_base_url(&base);
    let mut state = new_state("q", twilio_keys("AC-unknown"));
    state.set_output("report ready");

    let err = node
        .execute(&ctx("whatsapp", NodeParams::new().with("to_number", "+15550001")), &mut state)
        .await
        .unwrap_err();
    assert_eq!(
        failure_message(err),
        "Twilio returned HTTP 404: The requested resource was not found"
    );
    assert!(!state.extras.contains_key("whatsapp_status"));
}

// Slack

async fn post_message(req: HttpRequest, body: web::Json<serde_json::Value>) -> HttpResponse {
    assert_eq!(header(&req, "authorization"), format!("Bearer {}", GOOD_KEY));
    if body["channel"] != "#general" {
        return HttpResponse::Ok().json(json!({ "ok": false, "error": "channel_not_found" }));
    }
    HttpResponse::Ok().json(json!({ "ok": true, "ts": "1700000000.000100" }))
}

fn slack_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/chat.postMessage", web::post().to(post_message));
}

#[actix_web::test]
async fn test_slack_posts_message() {
    let base = serve(slack_routes).await;
    let node = SlackNode::new().with_endpoint(format!("{}/api/chat.postMessage", base));
    let mut state = new_state("q", ApiKeys::new().with("slack", GOOD_KEY));
    state.set_output("deploy finished");

    node.execute(&ctx("slack", NodeParams::new().with("channel", "#general")), &mut state)
        .await
        .unwrap();
    assert_eq!(state.extras.get("slack_ts"), Some(&Value::from("1700000000.000100")));
    assert_eq!(state.current_output, Some(Value::from("deploy finished")));
}

#[actix_web::test]
async fn test_slack_reports_rejection() {
    let base = serve(slack_routes).await;
    let node = SlackNode::new().with_endpoint(format!("{}/api/chat.postMessage", base));
    let mut state = new_state("q", ApiKeys::new().with("slack", GOOD_KEY));
    state.set_output("deploy finished");

    let err = node
        .execute(&ctx("slack", NodeParams::new().with("channel", "#nowhere")), &mut state)
        .await
        .unwrap_err();
    assert_eq!(failure_message(err), "Slack rejected message: channel_not_found");
}

// YouTube transcripts

async fn watch_page(query: web::Query<HashMap<String, String>>) -> HttpResponse {
    let html = match query.get("v").map(String::as_str) {
        Some("abc123") => r#"<html><script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"/api/timedtext?v=abc123&lang=en","languageCode":"en"},{"baseUrl":"/api/timedtext?v=abc123&lang=de","languageCode":"de"}]}}};</script></html>"#,
        _ => "<html><script>var ytInitialPlayerResponse = {\"playabilityStatus\":{}};</script></html>",
    };
    HttpResponse::Ok().content_type("text/html").body(html)
}

async fn timed_text(query: web::Query<HashMap<String, String>>) -> HttpResponse {
    assert_eq!(query.get("fmt").map(String::as_str), Some("json3"));
    let text = match query.get("lang").map(String::as_str) {
        Some("de") => "Hallo Welt",
        _ => "Hello\nworld",
    };
    HttpResponse::Ok().json(json!({
        "events": [
            { "tStartMs": 0, "segs": [{ "utf8": text }] },
            { "tStartMs": 900 },
            { "tStartMs": 1200, "segs": [{ "utf8": "from " }, { "utf8": "Rust" }] },
        ]
    }))
}

fn youtube_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/watch", web::get().to(watch_page))
        .route("/api/timedtext", web::get().to(timed_text))
        .route("/v1/chat/completions", web::post().to(chat_completions));
}

fn video_node(base: &str) -> VideoSummaryNode {
    VideoSummaryNode::new()
        .with_youtube_base_url(base)
        .with_openai_base_url(format!("{}/v1", base))
}

#[actix_web::test]
async fn test_video_summary_summarises_transcript() {
    let base = serve(youtube_routes).await;
    let mut state = new_state("q", ApiKeys::new().with("openai", GOOD_KEY));

    video_node(&base)
        .execute(&ctx("video_summary", NodeParams::new().with("video_id", "abc123")), &mut state)
        .await
        .unwrap();

    let output = state.current_output.unwrap();
    assert_eq!(output.get("status"), Some(&Value::from("success")));
    assert_eq!(output.get("video_id"), Some(&Value::from("abc123")));
    assert_eq!(
        output.get("summary"),
        Some(&Value::from("gpt-3.5-turbo says Hello world from Rust (2 messages)"))
    );
    assert!(state.error.is_none());
}

#[actix_web::test]
async fn test_video_summary_picks_requested_language() {
    let base = serve(youtube_routes).await;
    let mut state = new_state("q", ApiKeys::new().with("openai", GOOD_KEY));
    let params = NodeParams::new().with("video_id", "abc123").with("language", "de");

    video_node(&base).execute(&ctx("video_summary", params), &mut state).await.unwrap();
    assert_eq!(
        state.current_output.unwrap().get("summary"),
        Some(&Value::from("gpt-3.5-turbo says Hallo Welt from Rust (2 messages)"))
    );
}

#[actix_web::test]
async fn test_video_summary_failures_are_soft() {
    let base = serve(youtube_routes).await;

    let mut state = new_state("q", ApiKeys::new().with("openai", GOOD_KEY));
    let params = NodeParams::new().with("video_id", "abc123").with("language", "fr");
    video_node(&base).execute(&ctx("video_summary", params), &mut state).await.unwrap();
    assert_eq!(
        state.error.as_deref(),
        Some("No 'fr' transcript available for video abc123")
    );
    let output = state.current_output.unwrap();
    assert_eq!(output.get("status"), Some(&Value::from("failed")));
    assert_eq!(
        output.get("reason"),
        Some(&Value::from("No 'fr' transcript available for video abc123"))
    );

    let mut state = new_state("q", ApiKeys::new().with("openai", GOOD_KEY));
    let params = NodeParams::new().with("video_id", "nocaptions");
    video_node(&base).execute(&ctx("video_summary", params), &mut state).await.unwrap();
    assert_eq!(
        state.error.as_deref(),
        Some("No transcripts available for video nocaptions")
    );

    let mut state = new_state("q", ApiKeys::new());
    let params = NodeParams::new().with("video_id", "abc123");
    video_node(&base).execute(&ctx("video_summary", params), &mut state).await.unwrap();
    assert_eq!(state.error.as_deref(), Some("Missing credential: openai"));
}

#[test]
fn test_video_summary_params_are_checked() {
    let node = VideoSummaryNode::new();
    assert_eq!(
        node.validate_params(&NodeParams::new()).unwrap_err(),
        NodeError::MissingParam("video_id".to_string())
    );
    assert!(matches!(
        node.validate_params(&NodeParams::new().with("video_id", "a/b?c")),
        Err(NodeError::InvalidParam { ref param, .. }) if param == "video_id"
    ));
    assert!(node.validate_params(&NodeParams::new().with("video_id", "dQw4w9WgXcQ")).is_ok());
}
