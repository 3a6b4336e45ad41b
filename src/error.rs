use crate::decoder::DecodeError;

/// Why a generation call failed.
///
/// The `Display` text of each variant is shown to the user as-is, so each one
/// carries a hint about what to do next.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(
        "Cannot connect to the model server at {url}. Make sure Ollama is running and the \
         server URL is correct (`ollama-summarizer use --server <url>`). Details: {source}"
    )]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "Model server rejected the cross-origin request (HTTP 403): {body}\n\n\
         Set OLLAMA_ORIGINS=\"*\" in the server's environment and restart it."
    )]
    CorsBlocked { body: String },

    #[error(
        "Model \"{model}\" not found (HTTP 404): {body}\n\n\
         Pick another model (`ollama-summarizer models`) or install it: ollama pull {model}"
    )]
    ModelNotFound { model: String, body: String },

    #[error("Model server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("Response stream is corrupt: {0}")]
    Decode(#[from] DecodeError),

    #[error("Response stream was interrupted before it finished: {0}")]
    Interrupted(#[source] reqwest::Error),

    #[error("Failed to read settings: {0}")]
    Config(String),
}

impl GenerateError {
    /// Classify a non-2xx response from the model server.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String, model: &str) -> Self {
        match status.as_u16() {
            403 => GenerateError::CorsBlocked { body },
            404 if body.contains("not found") => GenerateError::ModelNotFound {
                model: model.to_string(),
                body,
            },
            code => GenerateError::Server { status: code, body },
        }
    }

    /// Classify a non-2xx response to a request that names no model, such as
    /// listing installed models.
    pub(crate) fn from_listing_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            403 => GenerateError::CorsBlocked { body },
            code => GenerateError::Server { status: code, body },
        }
    }
}
