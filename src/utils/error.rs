use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Mapping failed: {message}")]
    Mapping { message: String },

    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("Field '{field}' is bound to column '{column}', which the record does not have")]
    Binding { field: String, column: String },

    #[error("Template placeholder '{{{{{placeholder}}}}}' has no field binding")]
    UnboundField { placeholder: String },

    #[error("Catalog error: {message}")]
    Catalog { message: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query engine error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Mapping,
    Rendering,
    Transport,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConvertError {
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Mapping { .. } | Self::UnknownColumn { .. } | Self::Sql(_) => {
                ErrorCategory::Mapping
            }
            Self::TemplateNotFound { .. } | Self::Binding { .. } | Self::UnboundField { .. } => {
                ErrorCategory::Rendering
            }
            Self::Transport { .. } | Self::Api(_) => ErrorCategory::Transport,
            Self::Catalog { .. }
            | Self::Config { .. }
            | Self::InvalidConfigValue { .. }
            | Self::TomlParse(_) => ErrorCategory::Configuration,
            Self::Csv(_) | Self::Io(_) | Self::Serialization(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Transport => ErrorSeverity::Medium,
            ErrorCategory::Mapping | ErrorCategory::Rendering => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::UnknownColumn { column } => {
                format!("The column '{}' does not exist in the current table", column)
            }
            Self::TemplateNotFound { name } => {
                format!("Could not find the webservice template '{}'", name)
            }
            Self::UnboundField { placeholder } => format!(
                "The template needs a value for '{}' but no column is mapped to it",
                placeholder
            ),
            Self::Api(_) | Self::Transport { .. } => {
                "Could not reach the webservice endpoint".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Mapping => "Check the column names and the query against the current table",
            ErrorCategory::Rendering => "Check the field binding and the template placeholders",
            ErrorCategory::Transport => "Check the endpoint URL, credentials and network access",
            ErrorCategory::Configuration => "Fix the job file and run again",
            ErrorCategory::System => "Check that input files exist and are readable",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_field_message_shows_placeholder_token() {
        let err = ConvertError::UnboundField {
            placeholder: "EmployeeId".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Template placeholder '{{EmployeeId}}' has no field binding"
        );
        assert_eq!(err.category(), ErrorCategory::Rendering);
    }

    #[test]
    fn test_severity_by_category() {
        let transport = ConvertError::Transport {
            message: "timeout".to_string(),
        };
        assert_eq!(transport.category(), ErrorCategory::Transport);
        assert_eq!(transport.severity(), ErrorSeverity::Medium);

        let io = ConvertError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.severity(), ErrorSeverity::Critical);
    }
}
