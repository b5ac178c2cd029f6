use chaincore::{ApiKeys, Node, NodeContext, NodeError, NodeParams, NodeParamsMap, State, Value};
use chainnodes::{
    render_pdf, standard_registry, standard_registry_with, wrap_lines, EmailConfig, EmailNode,
    GeminiAdvancedParams, NodeOptions, OpenAiAdvancedNode, OpenAiAdvancedParams, OpenAiNode, PdfNode,
    SlackNode, TextEditorNode, TextFileNode, WhatsAppNode,
};
use chainruntime::{ChainRuntime, NodeRegistry, RuntimeConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

fn state_with_output(output: impl Into<Value>) -> State {
    let mut state = State::new("query", ApiKeys::new(), NodeParamsMap::new());
    state.set_output(output);
    state
}

fn field<'a>(value: &'a Value, name: &str) -> &'a Value {
    value.get(name).unwrap_or_else(|| panic!("missing field {}", name))
}

#[test]
fn test_standard_registry_has_every_node() {
    let registry = standard_registry().unwrap();
    assert_eq!(
        registry.list_node_types(),
        vec![
            "claude",
            "database",
            "email",
            "gemini",
            "gemini/advanced",
            "hashnode",
            "openai",
            "openai/advanced",
            "pdf",
            "slack",
            "text",
            "text_editor",
            "video_summary",
            "webhook",
            "whatsapp",
        ]
    );

    for node_type in registry.list_node_types() {
        let metadata = registry.get_metadata(&node_type).unwrap();
        assert!(!metadata.description.is_empty(), "{} has no description", node_type);
    }
}

#[test]
fn test_register_all_twice_is_rejected() {
    let mut registry = NodeRegistry::new();
    chainnodes::register_all(&mut registry).unwrap();
    assert!(chainnodes::register_all(&mut registry).is_err());
}

#[tokio::test]
async fn test_text_editor_uses_previous_output() {
    let node = TextEditorNode;
    let params = NodeParams::new().with(
        "edits",
        Value::Array(vec![Value::Object(BTreeMap::from([
            ("find".to_string(), Value::from("world")),
            ("replace".to_string(), Value::from("there")),
        ]))]),
    );
    let ctx = NodeContext::standalone("text_editor", params);
    let mut state = state_with_output("hello world");

    node.execute(&ctx, &mut state).await.unwrap();

    let output = state.current_output.unwrap();
    assert_eq!(field(&output, "text").as_str(), Some("hello there"));
    assert_eq!(field(&output, "format").as_str(), Some("plaintext"));
    assert_eq!(field(&output, "status").as_str(), Some("processed"));
}

#[tokio::test]
async fn test_text_editor_formats_before_edits() {
    let node = TextEditorNode;
    let params = NodeParams::new()
        .with("text", "draft")
        .with("format", "html")
        .with(
            "edits",
            Value::Array(vec![Value::Object(BTreeMap::from([
                ("find".to_string(), Value::from("pre>")),
                ("replace".to_string(), Value::from("code>")),
            ]))]),
        );
    let ctx = NodeContext::standalone("text_editor", params);
    let mut state = state_with_output("ignored");

    node.execute(&ctx, &mut state).await.unwrap();

    let output = state.current_output.unwrap();
    assert_eq!(field(&output, "text").as_str(), Some("<code>draft</code>"));
    assert_eq!(field(&output, "format").as_str(), Some("html"));
}

#[test]
fn test_text_editor_rejects_malformed_edits() {
    let node = TextEditorNode;
    let params = NodeParams::new().with("edits", Value::Array(vec![Value::from("oops")]));
    assert!(matches!(
        node.validate_params(&params),
        Err(NodeError::InvalidParam { ref param, .. }) if param == "edits"
    ));

    let params = NodeParams::new().with("format", "rtf");
    assert!(node.validate_params(&params).is_err());
}

#[tokio::test]
async fn test_text_file_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let node = TextFileNode::new();
    let params = NodeParams::new()
        .with("filename", "report.txt")
        .with("save_path", dir.path().to_string_lossy().to_string());
    let ctx = NodeContext::standalone("text", params);
    let mut state = state_with_output("final answer");

    node.execute(&ctx, &mut state).await.unwrap();

    let path = dir.path().join("report.txt");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "final answer");

    let output = state.current_output.clone().unwrap();
    assert_eq!(field(&output, "filename").as_str(), Some("report.txt"));
    assert_eq!(field(&output, "size_bytes").as_u64(), Some(12));
    assert_eq!(
        field(&output, "filepath").as_str(),
        Some(path.to_string_lossy().as_ref())
    );
    assert_eq!(state.extras.get("download"), Some(&output));
}

#[tokio::test]
async fn test_text_file_default_name_follows_format() {
    let dir = tempfile::tempdir().unwrap();
    let node = TextFileNode::new();
    let params = NodeParams::new()
        .with("format", "markdown")
        .with("save_path", dir.path().to_string_lossy().to_string());
    let ctx = NodeContext::standalone("text", params);
    let mut state = state_with_output(Value::Object(BTreeMap::from([
        ("text".to_string(), Value::from("# Title")),
        ("status".to_string(), Value::from("processed")),
    ])));

    node.execute(&ctx, &mut state).await.unwrap();

    let written = std::fs::read_to_string(dir.path().join("workflow_output.md")).unwrap();
    assert_eq!(written, "# Title");
}

#[tokio::test]
async fn test_text_file_requires_output() {
    let dir = tempfile::tempdir().unwrap();
    let node = TextFileNode::new();
    let params = NodeParams::new().with("save_path", dir.path().to_string_lossy().to_string());
    let ctx = NodeContext::standalone("text", params);
    let mut state = State::new("query", ApiKeys::new(), NodeParamsMap::new());

    let err = node.execute(&ctx, &mut state).await.unwrap_err();
    assert!(matches!(err, NodeError::MissingInput(_)));
}

#[test]
fn test_text_file_rejects_path_in_filename() {
    let params = NodeParams::new().with("filename", "../escape.txt");
    assert!(TextFileNode::new().validate_params(&params).is_err());
}

#[tokio::test]
async fn test_pdf_node_renders_document() {
    let dir = tempfile::tempdir().unwrap();
    let node = PdfNode::new();
    let params = NodeParams::new()
        .with("title", "Summary")
        .with("save_path", dir.path().to_string_lossy().to_string());
    let ctx = NodeContext::standalone("pdf", params);
    let mut state = state_with_output("Quarterly numbers (draft)");

    node.execute(&ctx, &mut state).await.unwrap();

    let bytes = std::fs::read(dir.path().join("output.pdf")).unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));
    assert!(bytes.ends_with(b"%%EOF\n"));

    let output = state.current_output.unwrap();
    assert_eq!(field(&output, "pages").as_u64(), Some(1));
    assert_eq!(field(&output, "size_bytes").as_u64(), Some(bytes.len() as u64));
    assert!(state.extras.contains_key("document"));
}

#[test]
fn test_pdf_escapes_and_paginates() {
    let text = (0..120).map(|i| format!("line {} (x)", i)).collect::<Vec<_>>().join("\n");
    let document = render_pdf(None, &text).unwrap();
    assert_eq!(document.pages, 3);

    let body = String::from_utf8_lossy(&document.bytes);
    assert!(body.contains("(line 0 \\(x\\)) Tj"));
    assert!(body.contains("/Count 3"));

    // startxref must point at the xref table
    let start: usize = body
        .rsplit("startxref\n")
        .next()
        .and_then(|tail| tail.lines().next())
        .and_then(|n| n.parse().ok())
        .unwrap();
    assert!(body[start..].starts_with("xref"));
}

#[test]
fn test_pdf_encodes_latin_text() {
    let document = render_pdf(Some("Résumé"), "Café – naïve “quotes”").unwrap();
    let body = String::from_utf8_lossy(&document.bytes);

    assert!(body.contains("/Encoding /WinAnsiEncoding"));
    assert!(body.contains("(R\\351sum\\351) Tj"));
    assert!(body.contains("(Caf\\351 \\226 na\\357ve \\223quotes\\224) Tj T*"));
    assert!(!body.contains('?'));
}

#[tokio::test]
async fn test_pdf_rejects_text_the_font_cannot_encode() {
    let err = render_pdf(None, "summary: 日本").unwrap_err();
    assert!(matches!(err, NodeError::ExecutionFailed(ref m) if m.contains("U+65E5")));

    let dir = tempfile::tempdir().unwrap();
    let params = NodeParams::new().with("save_path", dir.path().to_string_lossy().to_string());
    let ctx = NodeContext::standalone("pdf", params);
    let mut state = state_with_output("emoji 🚀");

    assert!(PdfNode::new().execute(&ctx, &mut state).await.is_err());
    assert!(!dir.path().join("output.pdf").exists());
}

#[tokio::test]
async fn test_confined_file_node_stays_in_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let node = TextFileNode::confined_to(dir.path());

    for escape in ["/etc", "../outside", "reports/../../outside"] {
        let params = NodeParams::new().with("save_path", escape);
        assert!(
            matches!(
                node.validate_params(&params),
                Err(NodeError::InvalidParam { ref param, .. }) if param == "save_path"
            ),
            "{}",
            escape
        );
    }

    let params = NodeParams::new().with("save_path", "reports/q3").with("filename", "a.txt");
    let ctx = NodeContext::standalone("text", params);
    let mut state = state_with_output("numbers");
    node.execute(&ctx, &mut state).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("reports/q3/a.txt")).unwrap(),
        "numbers"
    );

    let ctx = NodeContext::standalone("text", NodeParams::new());
    node.execute(&ctx, &mut state_with_output("default")).await.unwrap();
    assert!(dir.path().join("workflow_output.txt").exists());
}

#[test]
fn test_options_confine_registry_file_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let registry = standard_registry_with(&NodeOptions {
        output_dir: Some(dir.path().to_path_buf()),
    })
    .unwrap();

    let params = NodeParams::new().with("save_path", "/tmp");
    for node_id in ["text", "pdf"] {
        let node = registry.lookup(node_id).unwrap();
        assert!(node.validate_params(&params).is_err(), "{}", node_id);
    }
}

#[test]
fn test_wrap_breaks_on_words() {
    let lines = wrap_lines("aaa bbb ccc", 7);
    assert_eq!(lines, vec!["aaa bbb", "ccc"]);

    let lines = wrap_lines("abcdefghij", 4);
    assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
}

#[tokio::test]
async fn test_llm_nodes_require_credentials() {
    let mut state = State::new("hi", ApiKeys::new(), NodeParamsMap::new());

    let err = OpenAiNode::new()
        .execute(&NodeContext::standalone("openai", NodeParams::new()), &mut state)
        .await
        .unwrap_err();
    assert_eq!(err, NodeError::MissingCredential("openai".to_string()));

    let registry = standard_registry().unwrap();
    for (node_id, credential) in [
        ("gemini", "gemini"),
        ("gemini/advanced", "gemini"),
        ("claude", "anthropic"),
    ] {
        let node = registry.lookup(node_id).unwrap();
        let err = node
            .execute(&NodeContext::standalone(node_id, NodeParams::new()), &mut state)
            .await
            .unwrap_err();
        assert_eq!(err, NodeError::MissingCredential(credential.to_string()), "{}", node_id);
    }
}

#[tokio::test]
async fn test_openai_advanced_failure_records_error() {
    let node = OpenAiAdvancedNode::new().with_base_url("http://127.0.0.1:1");
    let api_keys = ApiKeys::new().with("openai", "sk-test");
    let mut state = State::new("hi", api_keys, NodeParamsMap::new());

    let result = node
        .execute(&NodeContext::standalone("openai/advanced", NodeParams::new()), &mut state)
        .await;

    assert!(result.is_err());
    assert!(state.error.unwrap().starts_with("OpenAI Error"));
}

#[test]
fn test_advanced_params_are_checked() {
    let params = NodeParams::new().with("temperature", 3.5);
    assert!(OpenAiAdvancedParams::from_params(&params).is_err());

    let params = NodeParams::new()
        .with("model", "gpt-4o")
        .with("max_tokens", 256u64)
        .with("json_mode", true)
        .with("system_instruction", "Be brief");
    let parsed = OpenAiAdvancedParams::from_params(&params).unwrap();
    let body = parsed.request_body("question");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "question");

    let params = NodeParams::new().with("model", "gemini-0.1-nano");
    assert!(GeminiAdvancedParams::from_params(&params).is_err());

    let params = NodeParams::new().with("context", "Rust");
    let body = GeminiAdvancedParams::from_params(&params).unwrap().request_body("why?");
    assert_eq!(
        body["contents"][0]["parts"][0]["text"],
        "Context: Rust\n\nQuestion: why?"
    );
}

#[test]
fn test_messaging_params_are_checked() {
    assert!(matches!(
        WhatsAppNode::new().validate_params(&NodeParams::new()),
        Err(NodeError::MissingParam(ref p)) if p == "to_number"
    ));
    assert!(matches!(
        SlackNode::new().validate_params(&NodeParams::new()),
        Err(NodeError::MissingParam(ref p)) if p == "channel"
    ));
    assert!(SlackNode::new()
        .validate_params(&NodeParams::new().with("channel", "#general"))
        .is_ok());
}

#[tokio::test]
async fn test_email_without_content_is_an_error() {
    let mut state = State::new("hi", ApiKeys::new(), NodeParamsMap::new());
    let err = EmailNode
        .execute(&NodeContext::standalone("email", NodeParams::new()), &mut state)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::MissingInput(_)));

    state.set_output("body");
    let err = EmailNode
        .execute(&NodeContext::standalone("email", NodeParams::new()), &mut state)
        .await
        .unwrap_err();
    assert_eq!(err, NodeError::MissingCredential("email_config".to_string()));
}

#[test]
fn test_email_port_must_be_a_port_number() {
    let config = |port: Value| {
        BTreeMap::from([
            ("smtp_server".to_string(), Value::from("smtp.example.com")),
            ("smtp_port".to_string(), port),
            ("username".to_string(), Value::from("user")),
            ("password".to_string(), Value::from("secret")),
            ("from_email".to_string(), Value::from("bot@example.com")),
            ("to_email".to_string(), Value::from("team@example.com")),
        ])
    };

    assert_eq!(EmailConfig::from_credentials(&config(Value::from(587i64))).unwrap().smtp_port, 587);
    assert_eq!(EmailConfig::from_credentials(&config(Value::from("25"))).unwrap().smtp_port, 25);
    for bad in [Value::from(465.7), Value::from(f64::NAN), Value::from(-1i64), Value::from(70000i64)] {
        assert!(
            matches!(EmailConfig::from_credentials(&config(bad.clone())), Err(NodeError::Configuration(_))),
            "{:?}",
            bad
        );
    }
}

#[tokio::test]
async fn test_email_send_failure_is_soft() {
    let config = Value::Object(BTreeMap::from([
        ("smtp_server".to_string(), Value::from("127.0.0.1")),
        ("smtp_port".to_string(), Value::from(1u64)),
        ("username".to_string(), Value::from("user")),
        ("password".to_string(), Value::from("secret")),
        ("from_email".to_string(), Value::from("bot@example.com")),
        ("to_email".to_string(), Value::from("team@example.com")),
    ]));
    let mut state = State::new("hi", ApiKeys::new().with("email_config", config), NodeParamsMap::new());
    state.set_output("weekly report");

    EmailNode
        .execute(&NodeContext::standalone("email", NodeParams::new()), &mut state)
        .await
        .unwrap();

    let error = state.error.clone().unwrap();
    assert!(error.starts_with("Email failed:"));
    assert_eq!(state.current_output, Some(Value::from(error)));
}

#[tokio::test]
async fn test_editor_then_file_through_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = ChainRuntime::with_registry(
        Arc::new(standard_registry().unwrap()),
        RuntimeConfig::default(),
    );

    let mut node_params = NodeParamsMap::new();
    node_params.insert(
        "text_editor".to_string(),
        NodeParams::new().with("text", "hello").with("format", "markdown"),
    );
    node_params.insert(
        "text".to_string(),
        NodeParams::new()
            .with("filename", "out.md")
            .with("save_path", dir.path().to_string_lossy().to_string()),
    );

    let output = runtime
        .run_workflow(&["text_editor", "text"], "ignored", ApiKeys::new(), Some(node_params))
        .await
        .unwrap();

    assert_eq!(field(&output, "filename").as_str(), Some("out.md"));
    let written = std::fs::read_to_string(dir.path().join("out.md")).unwrap();
    assert_eq!(written, "```markdown\nhello\n```");
}
