use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracemapError {
    #[error("not initialized: run 'tracemap init'")]
    NotInitialized,

    #[error("invalid template '{template}': {reason}")]
    TemplateInvalid { template: String, reason: String },

    #[error("no template registered for trigger '{0}'")]
    UnknownTrigger(String),

    #[error("duplicate template for trigger '{0}'")]
    DuplicateTemplate(String),

    #[error("invalid identifier '{0}': must be alphanumeric with '_', '-' or '.'")]
    InvalidIdentifier(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl TracemapError {
    pub(crate) fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        TracemapError::TemplateInvalid {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TracemapError>;
