use chainruntime::SoftFailurePolicy;
use chainnodes::OPENAI_BASE_URL;
use std::path::PathBuf;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Server settings, read once at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,

    /// Key used by the `/chat` assistant; the endpoint answers 503 without it
    pub openai_api_key: Option<String>,

    pub openai_base_url: String,

    pub soft_failure: SoftFailurePolicy,

    /// Directory the `text` and `pdf` nodes write beneath
    pub output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            openai_api_key: None,
            openai_base_url: OPENAI_BASE_URL.to_string(),
            soft_failure: SoftFailurePolicy::default(),
            output_dir: std::env::temp_dir(),
        }
    }
}

impl ServerConfig {
    /// Read `BIND_ADDRESS`, `OPENAI_API_KEY`, `CHAIN_SOFT_FAILURE` and
    /// `CHAIN_OUTPUT_DIR`
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        config.openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Ok(policy) = std::env::var("CHAIN_SOFT_FAILURE") {
            config.soft_failure = policy.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(dir) = std::env::var_os("CHAIN_OUTPUT_DIR").filter(|dir| !dir.is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}
