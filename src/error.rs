use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed by peer")]
    Disconnected,

    /// the remote side refused the request, `code` is machine readable.
    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("no partition left to assign")]
    NoAssignment,

    #[error("invalid image {name}: {reason}")]
    Image { name: String, reason: String },
}

impl Error {
    pub fn image(name: &str, reason: impl Into<String>) -> Self {
        Self::Image {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
