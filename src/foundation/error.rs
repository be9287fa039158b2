/// Convenience result type used across the crate.
pub type SceneResult<T> = Result<T, SceneError>;

/// Top-level error taxonomy used by the scene APIs.
///
/// Recoverable per-layer problems (fetch/decode failures, structurally
/// incomplete layers) are represented as [`SceneError::Layer`] and are
/// swallowed and logged at the render/export boundary; they never propagate
/// out of `render`/`export_psd`. Fatal problems (canvas allocation, encoder
/// failures) surface as [`SceneError::Render`].
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// Invalid user-provided or document data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A single layer could not be prepared or painted.
    #[error("layer error: {0}")]
    Layer(String),

    /// A whole-operation rendering or export failure.
    #[error("render error: {0}")]
    Render(String),

    /// Errors when serializing or deserializing scene documents.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SceneError {
    /// Build a [`SceneError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SceneError::Layer`] value.
    pub fn layer(msg: impl Into<String>) -> Self {
        Self::Layer(msg.into())
    }

    /// Build a [`SceneError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`SceneError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}
