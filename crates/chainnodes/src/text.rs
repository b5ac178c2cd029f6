use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plaintext,
    Markdown,
    Html,
}

impl TextFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaintext" | "plain" | "txt" | "text" => Some(TextFormat::Plaintext),
            "markdown" | "md" => Some(TextFormat::Markdown),
            "html" => Some(TextFormat::Html),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextFormat::Plaintext => "plaintext",
            TextFormat::Markdown => "markdown",
            TextFormat::Html => "html",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TextFormat::Plaintext => "txt",
            TextFormat::Markdown => "md",
            TextFormat::Html => "html",
        }
    }

    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        match params.get_non_empty_str("format")? {
            None => Ok(TextFormat::Plaintext),
            Some(raw) => TextFormat::parse(raw)
                .ok_or_else(|| NodeError::invalid_param("format", "expected plaintext, markdown or html")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub find: String,
    pub replace: String,
}

/// Options recognised by `text_editor`
#[derive(Debug, Clone, PartialEq)]
pub struct TextEditorParams {
    pub text: Option<String>,
    pub format: TextFormat,
    pub edits: Vec<TextEdit>,
}

impl TextEditorParams {
    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        let edits = params
            .get_array("edits")?
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, edit)| {
                let field = |name: &str| edit.get(name).and_then(Value::as_str).map(str::to_string);
                match (field("find"), field("replace")) {
                    (Some(find), Some(replace)) if !find.is_empty() => Ok(TextEdit { find, replace }),
                    _ => Err(NodeError::invalid_param(
                        "edits",
                        format!("entry {} needs non-empty 'find' and a 'replace' string", i),
                    )),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            text: params.get_str("text")?.map(str::to_string),
            format: TextFormat::from_params(params)?,
            edits,
        })
    }

    /// Wrap for the requested format, then apply edits in order
    pub fn apply(&self, input: &str) -> String {
        let wrapped = match self.format {
            TextFormat::Plaintext => input.to_string(),
            TextFormat::Markdown => format!("```markdown\n{}\n```", input),
            TextFormat::Html => format!("<pre>{}</pre>", input),
        };

        self.edits
            .iter()
            .fold(wrapped, |text, edit| text.replace(&edit.find, &edit.replace))
    }
}

/// Rewrites text from the previous node or from the `text` param
pub struct TextEditorNode;

#[async_trait]
impl Node for TextEditorNode {
    fn node_type(&self) -> &str {
        "text_editor"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let options = TextEditorParams::from_params(&ctx.params)?;
        let input = match &options.text {
            Some(text) if !text.is_empty() => text.clone(),
            _ => state.output_text().unwrap_or_default(),
        };

        let processed = options.apply(&input);

        let mut output = BTreeMap::new();
        output.insert("text".to_string(), Value::from(processed));
        output.insert("format".to_string(), Value::from(options.format.as_str()));
        output.insert("status".to_string(), Value::from("processed"));
        state.set_output(Value::Object(output));
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        TextEditorParams::from_params(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Format and edit text from the previous node".to_string(),
            category: "transform".to_string(),
            params: vec![
                ParamDefinition::optional("text", "Text to use instead of the previous output"),
                ParamDefinition::optional("format", "plaintext, markdown or html"),
                ParamDefinition::optional("edits", "List of {find, replace} substitutions"),
            ],
        }
    }
}
