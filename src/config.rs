use std::env;
use std::time::Duration;

/// Default Ollama endpoint for a local install.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model to request from the server.
pub const DEFAULT_MODEL: &str = "deepseek-r1:1.5b";

/// Whole-request budget for a generation call (connect + stream drain).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Budget for liveness/listing probes against the tags endpoint.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Config {
    pub base_url: String,
    pub model: String,
    /// Provider names injected in place of a linked tensor runtime.
    /// None means no capability source is installed on this host.
    pub providers: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        let base_url = env::var("OLLAMA_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = env::var("OLLAMA_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                tracing::info!("OLLAMA_MODEL not set — defaulting to {DEFAULT_MODEL}");
                DEFAULT_MODEL.to_string()
            });

        let providers = env::var("SIROCCO_PROVIDERS").ok().map(|raw| {
            raw.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        });

        Config {
            base_url,
            model,
            providers,
        }
    }
}
