//! YouTube transcript summaries.
//!
//! The transcript comes from the caption track listed in the watch page's
//! player response, fetched in YouTube's `json3` timed-text format. Failures
//! after the params are bound are soft: the node records the reason in
//! `State::error` and outputs `{status: "failed", reason}`.

use crate::http::{self, DEFAULT_TIMEOUT};
use crate::openai::{chat_completion, OPENAI_BASE_URL};
use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";
const SUMMARY_MODEL: &str = "gpt-3.5-turbo";
const SUMMARY_INSTRUCTION: &str = "Summarize this in 3 bullet points:";
const DEFAULT_LANGUAGE: &str = "en";

/// Options recognised by `video_summary`
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSummaryParams {
    pub video_id: String,
    pub language: String,
}

impl VideoSummaryParams {
    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        let video_id = params.require_str("video_id")?.trim();
        if !video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(NodeError::invalid_param("video_id", "expected a YouTube video id"));
        }

        Ok(Self {
            video_id: video_id.to_string(),
            language: params
                .get_non_empty_str("language")?
                .unwrap_or(DEFAULT_LANGUAGE)
                .to_string(),
        })
    }
}

/// Summarises a YouTube video's transcript with OpenAI
pub struct VideoSummaryNode {
    youtube_base_url: String,
    openai_base_url: String,
    timeout: Duration,
}

impl VideoSummaryNode {
    pub fn new() -> Self {
        Self {
            youtube_base_url: YOUTUBE_BASE_URL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_youtube_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.youtube_base_url = base_url.into();
        self
    }

    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = base_url.into();
        self
    }

    async fn summarise(&self, options: &VideoSummaryParams, state: &State) -> Result<String, NodeError> {
        let transcript = fetch_transcript(
            &self.youtube_base_url,
            &options.video_id,
            &options.language,
            self.timeout,
        )
        .await?;

        let api_key = state.api_keys().require_str("openai")?;
        let body = json!({
            "model": SUMMARY_MODEL,
            "messages": [
                { "role": "system", "content": SUMMARY_INSTRUCTION },
                { "role": "user", "content": transcript },
            ],
        });
        chat_completion(&self.openai_base_url, api_key, &body, self.timeout).await
    }
}

impl Default for VideoSummaryNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for VideoSummaryNode {
    fn node_type(&self) -> &str {
        "video_summary"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let options = VideoSummaryParams::from_params(&ctx.params)?;
        ctx.events.info(format!("Fetching transcript for video {}", options.video_id));

        let mut output = BTreeMap::new();
        match self.summarise(&options, state).await {
            Ok(summary) => {
                output.insert("summary".to_string(), Value::from(summary));
                output.insert("video_id".to_string(), Value::from(options.video_id));
                output.insert("status".to_string(), Value::from("success"));
            }
            Err(e) => {
                let reason = e.detail();
                tracing::error!("Video summary failed: {}", reason);
                state.set_error(reason.clone());
                output.insert("status".to_string(), Value::from("failed"));
                output.insert("reason".to_string(), Value::from(reason));
            }
        }
        state.set_output(Value::Object(output));
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        VideoSummaryParams::from_params(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Summarise a YouTube video's transcript with OpenAI".to_string(),
            category: "llm".to_string(),
            params: vec![
                ParamDefinition::required("video_id", "YouTube video id"),
                ParamDefinition::optional("language", "Transcript language code (default en)"),
            ],
        }
    }
}

/// Transcript text of one video, segments joined by spaces
pub async fn fetch_transcript(
    base_url: &str,
    video_id: &str,
    language: &str,
    timeout: Duration,
) -> Result<String, NodeError> {
    let client = http::client(timeout)?;
    let base_url = base_url.trim_end_matches('/');

    let page = client
        .get(format!("{}/watch", base_url))
        .query(&[("v", video_id), ("hl", language)])
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| NodeError::ExecutionFailed(format!("YouTube request failed: {}", e)))?
        .text()
        .await
        .map_err(|e| NodeError::ExecutionFailed(format!("YouTube response unreadable: {}", e)))?;

    let tracks = caption_tracks(&page).ok_or_else(|| {
        NodeError::ExecutionFailed(format!("No transcripts available for video {}", video_id))
    })?;
    let track_url = tracks
        .iter()
        .find(|track| track.get("languageCode").and_then(|c| c.as_str()) == Some(language))
        .and_then(|track| track.get("baseUrl").and_then(|u| u.as_str()))
        .ok_or_else(|| {
            NodeError::ExecutionFailed(format!(
                "No '{}' transcript available for video {}",
                language, video_id
            ))
        })?;

    // track URLs may be relative to the site
    let track_url = if track_url.starts_with('/') {
        format!("{}{}", base_url, track_url)
    } else {
        track_url.to_string()
    };

    let request = client.get(track_url).query(&[("fmt", "json3")]);
    let timed_text = http::send_json(request, "YouTube", timeout).await?;

    let transcript = transcript_text(&timed_text);
    if transcript.is_empty() {
        return Err(NodeError::ExecutionFailed("Empty transcript returned".to_string()));
    }
    Ok(transcript)
}

/// The `captionTracks` array embedded in a watch page
fn caption_tracks(page: &str) -> Option<Vec<serde_json::Value>> {
    const MARKER: &str = "\"captionTracks\":";
    let start = page.find(MARKER)? + MARKER.len();
    let tracks = serde_json::Deserializer::from_str(&page[start..])
        .into_iter::<serde_json::Value>()
        .next()?
        .ok()?;
    match tracks {
        serde_json::Value::Array(tracks) if !tracks.is_empty() => Some(tracks),
        _ => None,
    }
}

/// Join the segments of a `json3` timed-text document
fn transcript_text(timed_text: &serde_json::Value) -> String {
    let segments = timed_text
        .get("events")
        .and_then(|e| e.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    segments
        .iter()
        .filter_map(|event| event.get("segs").and_then(|s| s.as_array()))
        .map(|segs| {
            segs.iter()
                .filter_map(|seg| seg.get("utf8").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
