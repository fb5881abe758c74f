use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiroccoError {
    #[error("server unreachable: {0}")]
    Connectivity(String),

    #[error("request timed out")]
    Timeout,

    #[error("API returned status code {status}")]
    Protocol { status: u16 },

    #[error("malformed stream line: {0}")]
    LineParse(String),

    #[error("capability probe unavailable")]
    ProbeUnavailable,

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl SiroccoError {
    /// Classify a transport error into the taxonomy. Timeouts and refused
    /// connections get their own variants; everything else stays a
    /// catch-all `Request`.
    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connectivity(e.to_string())
        } else {
            Self::Request(e)
        }
    }

    /// Render the compatibility-mode terminal fragment. The exact shape
    /// (`"\nError: <description>\n"`) is observable behavior: interactive
    /// callers see failures as part of the response text.
    pub fn inline_text(&self) -> String {
        format!("\nError: {}\n", self.inline_description())
    }

    fn inline_description(&self) -> String {
        match self {
            Self::Timeout => "Request timed out".to_string(),
            Self::Protocol { status } => format!("API returned status code {status}"),
            Self::Connectivity(msg) => format!("Request failed: {msg}"),
            Self::Request(e) => format!("Request failed: {e}"),
            Self::LineParse(msg) => format!("Request failed: {msg}"),
            Self::ProbeUnavailable => "capability probe unavailable".to_string(),
        }
    }
}
