use thiserror::Error;

/// Failure of a single file's transform. Every variant is fatal for that file
/// and carries enough context for a build tool to print an actionable
/// diagnostic; the engine never retries.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The raw source already contains the configured dependency-map name.
    /// Checked as a substring scan over the whole byte content before parsing,
    /// so a hit inside a string literal or comment also fails.
    #[error("Source code contains the reserved string `{name}` at character offset {offset}")]
    ReservedTokenCollision { name: String, offset: usize },

    /// The parser rejected the input source.
    #[error("{filename}: parse error at {line}:{column}: {message}")]
    Parse {
        filename: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// Dependency collection failed. The inner message already names the
    /// offending call; the filename is prefixed so the diagnostic is
    /// file-scoped without losing the cause.
    #[error("{filename}: {message}")]
    InvalidDependencyCall { filename: String, message: String },

    /// The minifier's internal parser rejected code this pipeline generated.
    /// Kept distinct from [`TransformError::Parse`]: it signals a
    /// code-generation defect, not bad user input.
    #[error("{filename}:{line}:{column}: minifier failed to parse generated code: {message}")]
    MinifierParse {
        filename: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// The code generator failed over a rewritten tree. Like
    /// [`TransformError::MinifierParse`] this indicates a pipeline defect.
    #[error("{filename}: code generation failed: {message}")]
    Codegen { filename: String, message: String },

    #[error("{filename}: source is not valid UTF-8")]
    InvalidUtf8 { filename: String },

    #[error("{filename}: invalid JSON: {message}")]
    InvalidJson { filename: String, message: String },

    #[error("invalid transformer configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TransformError>;
