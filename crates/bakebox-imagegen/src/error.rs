#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image generation is not configured (set an API key)")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("image API returned no image")]
    NoImage,

    #[error("invalid source image: {0}")]
    InvalidDataUrl(String),
}
