use chaincore::{NodeError, NodeParams};

/// Prompt pieces shared by the advanced chat-completion nodes.
///
/// Each piece may arrive under its own name or under the `*_value` name the
/// editor uses for values wired in from another node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptParts {
    pub user_prompt: Option<String>,
    pub context: Option<String>,
    pub system_instruction: Option<String>,
}

impl PromptParts {
    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        Ok(Self {
            user_prompt: first_str(params, &["user_prompt", "user_prompt_value", "prompt_value", "input_value"])?,
            context: first_str(params, &["context", "context_value"])?,
            system_instruction: first_str(params, &["system_instruction", "system_instruction_value"])?,
        })
    }
}

fn first_str(params: &NodeParams, names: &[&str]) -> Result<Option<String>, NodeError> {
    for name in names {
        if let Some(value) = params.get_non_empty_str(name)? {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// Check an optional number against an inclusive range
pub(crate) fn number_in_range(
    params: &NodeParams,
    name: &str,
    min: f64,
    max: f64,
) -> Result<Option<f64>, NodeError> {
    match params.get_f64(name)? {
        Some(n) if n < min || n > max => Err(NodeError::invalid_param(
            name,
            format!("must be between {} and {}", min, max),
        )),
        other => Ok(other),
    }
}
