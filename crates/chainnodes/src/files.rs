//! Nodes that persist the current output to disk.
//!
//! Both nodes may be confined to an output directory. A confined node takes
//! `save_path` as a relative subdirectory of it and rejects absolute paths
//! and `..`; an unconfined node writes wherever `save_path` points.

use crate::pdf;
use crate::text::TextFormat;
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Where a node writes its file
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub filename: String,
    pub save_path: PathBuf,
}

impl OutputTarget {
    fn from_params(
        params: &NodeParams,
        default_filename: &str,
        root: Option<&Path>,
    ) -> Result<Self, NodeError> {
        let filename = params
            .get_non_empty_str("filename")?
            .map(str::to_string)
            .unwrap_or_else(|| default_filename.to_string());

        if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
            return Err(NodeError::invalid_param(
                "filename",
                "must be a bare file name; use save_path for the directory",
            ));
        }

        let requested = params.get_non_empty_str("save_path")?.map(PathBuf::from);
        let save_path = match (root, requested) {
            (None, Some(path)) => path,
            (None, None) => std::env::temp_dir(),
            (Some(root), None) => root.to_path_buf(),
            (Some(root), Some(path)) => {
                if !path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
                    return Err(NodeError::invalid_param(
                        "save_path",
                        "must be a relative directory inside the output directory",
                    ));
                }
                root.join(path)
            }
        };

        Ok(Self { filename, save_path })
    }

    pub fn filepath(&self) -> PathBuf {
        self.save_path.join(&self.filename)
    }

    async fn write(&self, contents: &[u8]) -> Result<PathBuf, NodeError> {
        tokio::fs::create_dir_all(&self.save_path).await.map_err(|e| {
            NodeError::ExecutionFailed(format!("cannot create {}: {}", self.save_path.display(), e))
        })?;

        let filepath = self.filepath();
        tokio::fs::write(&filepath, contents)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("cannot write {}: {}", filepath.display(), e)))?;
        Ok(filepath)
    }
}

/// Text of the current output. Objects carrying a `text` field (as produced
/// by `text_editor`) contribute that field.
fn document_text(state: &State) -> Result<String, NodeError> {
    let text = match &state.current_output {
        Some(Value::Object(fields)) => match fields.get("text").and_then(Value::as_str) {
            Some(text) => Some(text.to_string()),
            None => state.output_text(),
        },
        _ => state.output_text(),
    };
    text.ok_or_else(|| NodeError::MissingInput("No content to write from previous node".to_string()))
}

fn file_summary(path: &Path, filename: &str, size_bytes: usize) -> Value {
    let mut summary = BTreeMap::new();
    summary.insert("filepath".to_string(), Value::from(path.display().to_string()));
    summary.insert("filename".to_string(), Value::from(filename));
    summary.insert("size_bytes".to_string(), Value::from(size_bytes as u64));
    Value::Object(summary)
}

/// Writes the current output to a text file and replaces it with the
/// file's `{filepath, filename, size_bytes}`.
#[derive(Debug, Clone, Default)]
pub struct TextFileNode {
    root: Option<PathBuf>,
}

impl TextFileNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only write beneath `dir`
    pub fn confined_to(dir: impl Into<PathBuf>) -> Self {
        Self { root: Some(dir.into()) }
    }

    fn target(&self, params: &NodeParams) -> Result<OutputTarget, NodeError> {
        let format = TextFormat::from_params(params)?;
        OutputTarget::from_params(
            params,
            &format!("workflow_output.{}", format.extension()),
            self.root.as_deref(),
        )
    }
}

#[async_trait]
impl Node for TextFileNode {
    fn node_type(&self) -> &str {
        "text"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let target = self.target(&ctx.params)?;
        let content = document_text(state)?;

        let filepath = target.write(content.as_bytes()).await?;
        ctx.events.info(format!("Wrote {} bytes to {}", content.len(), filepath.display()));

        let summary = file_summary(&filepath, &target.filename, content.len());
        state.set_extra("download", summary.clone());
        state.set_output(summary);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        self.target(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Save the previous output as a text file".to_string(),
            category: "output".to_string(),
            params: vec![
                ParamDefinition::optional("filename", "File name (default workflow_output.<ext>)"),
                ParamDefinition::optional("save_path", "Directory (default output or temp dir)"),
                ParamDefinition::optional("format", "plaintext, markdown or html; picks the extension"),
            ],
        }
    }
}

/// Renders the current output into a PDF document on disk
#[derive(Debug, Clone, Default)]
pub struct PdfNode {
    root: Option<PathBuf>,
}

impl PdfNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only write beneath `dir`
    pub fn confined_to(dir: impl Into<PathBuf>) -> Self {
        Self { root: Some(dir.into()) }
    }

    fn options(&self, params: &NodeParams) -> Result<(OutputTarget, Option<String>), NodeError> {
        let target = OutputTarget::from_params(params, "output.pdf", self.root.as_deref())?;
        let title = params.get_non_empty_str("title")?.map(str::to_string);
        Ok((target, title))
    }
}

#[async_trait]
impl Node for PdfNode {
    fn node_type(&self) -> &str {
        "pdf"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let (target, title) = self.options(&ctx.params)?;
        let content = document_text(state)?;

        let document = pdf::render(title.as_deref(), &content)?;
        let filepath = target.write(&document.bytes).await?;
        ctx.events.info(format!(
            "Rendered {} page(s) to {}",
            document.pages,
            filepath.display()
        ));

        let mut summary = file_summary(&filepath, &target.filename, document.bytes.len());
        if let Value::Object(fields) = &mut summary {
            fields.insert("pages".to_string(), Value::from(document.pages as u64));
        }
        state.set_extra("document", summary.clone());
        state.set_output(summary);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        self.options(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Render the previous output into a PDF file".to_string(),
            category: "output".to_string(),
            params: vec![
                ParamDefinition::optional("filename", "File name (default output.pdf)"),
                ParamDefinition::optional("save_path", "Directory (default output or temp dir)"),
                ParamDefinition::optional("title", "Heading on the first page"),
            ],
        }
    }
}
