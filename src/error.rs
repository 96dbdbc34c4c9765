use thiserror::Error;

/// SQLSTATE `duplicate_object` (role already exists).
pub const SQLSTATE_DUPLICATE_OBJECT: &str = "42710";
/// SQLSTATE `duplicate_database`.
pub const SQLSTATE_DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE `undefined_object` (role does not exist).
pub const SQLSTATE_UNDEFINED_OBJECT: &str = "42704";
/// SQLSTATE `invalid_catalog_name` (database does not exist).
pub const SQLSTATE_INVALID_CATALOG_NAME: &str = "3D000";

/// Coarse classification of a [`ProvisionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Template,
    TemplateRender,
    Validation,
    Connection,
    Statement,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("unknown zone: {zone}")]
    UnknownZone { zone: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("template {template} failed to parse: {reason}")]
    TemplateParse { template: String, reason: String },

    #[error("forward and backward sequences differ in length ({forward} vs {backward})")]
    StepCountMismatch { forward: usize, backward: usize },

    #[error("unknown statement group: {0}")]
    UnknownGroup(String),

    #[error("template {template} references missing value {placeholder}")]
    TemplateRender { template: String, placeholder: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    #[error("statement {statement} failed{}: {message}", sqlstate_suffix(.code))]
    Statement {
        statement: String,
        code: Option<String>,
        message: String,
    },
}

fn sqlstate_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownZone { .. } | Self::Configuration(_) => ErrorKind::Configuration,
            Self::TemplateParse { .. } | Self::StepCountMismatch { .. } | Self::UnknownGroup(_) => {
                ErrorKind::Template
            }
            Self::TemplateRender { .. } => ErrorKind::TemplateRender,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Statement { .. } => ErrorKind::Statement,
        }
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Statement { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The cluster rejected a create because the object is already there.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.sqlstate(),
            Some(SQLSTATE_DUPLICATE_OBJECT | SQLSTATE_DUPLICATE_DATABASE)
        )
    }

    /// The cluster rejected a drop or revoke because the object is gone.
    pub fn is_already_absent(&self) -> bool {
        matches!(
            self.sqlstate(),
            Some(SQLSTATE_UNDEFINED_OBJECT | SQLSTATE_INVALID_CATALOG_NAME)
        )
    }

    /// Connection failures may be retried by the caller; nothing else is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}
