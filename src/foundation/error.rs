/// Convenience result type used across vidloom.
pub type VidloomResult<T> = Result<T, VidloomError>;

/// Top-level error taxonomy used by the export pipeline.
///
/// Every variant is fatal to the export session: an EBML document is only
/// valid once fully finalized, so there is no retry or partial output.
#[derive(thiserror::Error, Debug)]
pub enum VidloomError {
    /// Binary encoding failure: VINT/value out of range, write past the end
    /// of a stream buffer, inconsistent explicit widths.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Invalid user-provided data: track numbers out of range, malformed clip
    /// properties, non-monotonic chunk timestamps.
    #[error("validation error: {0}")]
    Validation(String),

    /// Compositing failure: a clip that cannot be rendered, bad surface
    /// dimensions.
    #[error("render error: {0}")]
    Render(String),

    /// Encoder configuration rejected (codec/resolution/bitrate combination).
    #[error("unsupported configuration: {0}")]
    UnsupportedConfig(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VidloomError {
    /// Build a [`VidloomError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`VidloomError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VidloomError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`VidloomError::UnsupportedConfig`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_taxonomy_prefix() {
        assert_eq!(VidloomError::encoding("x").to_string(), "encoding error: x");
        assert_eq!(
            VidloomError::validation("y").to_string(),
            "validation error: y"
        );
        assert_eq!(VidloomError::render("z").to_string(), "render error: z");
        assert_eq!(
            VidloomError::unsupported("w").to_string(),
            "unsupported configuration: w"
        );
    }
}
