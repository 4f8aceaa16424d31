//! Error types for the composer and its passes

/// Errors that can occur while driving or persisting a composer
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    /// The composer's buffers were disposed and not recreated
    #[error("composer buffers have been disposed; call reset() before rendering")]
    Disposed,
    /// A pass tried to record GPU work outside begin_frame/end_frame
    #[error("render called outside an active frame")]
    NoActiveFrame,
    /// A pass requested screen output but the frame has no surface view
    #[error("pass requested screen output but the frame was begun without one")]
    NoScreenTarget,
    /// IO error when reading/writing pipeline documents
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
