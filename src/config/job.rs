use crate::domain::model::{Credentials, UnmatchedPolicy};
use crate::utils::error::{ConvertError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_resolved,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// One conversion run, as described by a TOML job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub job: JobInfo,
    pub source: SourceConfig,
    #[serde(default)]
    pub mappings: Vec<MappingStepConfig>,
    pub webservice: WebserviceConfig,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// CSV export of the legacy table.
    pub input: String,
}

/// Either `column` + `lookup` (a two-column CSV) or `query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingStepConfig {
    pub column: Option<String>,
    pub lookup: Option<String>,
    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebserviceConfig {
    pub id: String,
    pub catalog: String,
    pub template: String,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_true")]
    pub escape_values: bool,
    /// Webservice field -> column of the mapped table.
    #[serde(default)]
    pub binding: BTreeMap<String, String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_true")]
    pub stop_on_auth_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    pub mapped_filename: Option<String>,
    #[serde(default = "default_report_filename")]
    pub report_filename: String,
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_output_path() -> String {
    "output".to_string()
}

fn default_report_filename() -> String {
    "send_report_{timestamp}.csv".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            stop_on_auth_failure: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            mapped_filename: None,
            report_filename: default_report_filename(),
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl EndpointConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

impl JobConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// Replaces `${VAR}` with the environment value; unset variables are left as they are
    /// and reported by `validate`.
    fn substitute_env_vars(content: &str) -> String {
        static ENV_VAR: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
            Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid")
        });

        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("job.name", &self.job.name)?;
        validate_path("source.input", &self.source.input)?;

        for (index, step) in self.mappings.iter().enumerate() {
            let field = format!("mappings[{}]", index);
            match (&step.column, &step.lookup, &step.query) {
                (Some(column), Some(lookup), None) => {
                    validate_non_empty_string(&format!("{}.column", field), column)?;
                    validate_path(&format!("{}.lookup", field), lookup)?;
                }
                (None, None, Some(query)) => {
                    validate_non_empty_string(&format!("{}.query", field), query)?;
                }
                _ => {
                    return Err(ConvertError::InvalidConfigValue {
                        field,
                        value: format!("{:?}", step),
                        reason: "set either `column` and `lookup`, or `query`".to_string(),
                    })
                }
            }
        }

        validate_non_empty_string("webservice.id", &self.webservice.id)?;
        validate_path("webservice.catalog", &self.webservice.catalog)?;
        validate_non_empty_string("webservice.template", &self.webservice.template)?;

        validate_resolved("endpoint.url", &self.endpoint.url)?;
        validate_url("endpoint.url", &self.endpoint.url)?;
        validate_resolved("endpoint.username", &self.endpoint.username)?;
        validate_resolved("endpoint.password", &self.endpoint.password)?;
        validate_non_empty_string("endpoint.username", &self.endpoint.username)?;
        if let Some(timeout) = self.endpoint.timeout_seconds {
            validate_positive_number("endpoint.timeout_seconds", timeout, 1)?;
        }

        validate_path("output.path", &self.output.path)?;
        validate_non_empty_string("output.report_filename", &self.output.report_filename)?;

        Ok(())
    }
}

impl Validate for JobConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// Expands `{job}` and `{timestamp}` in an output file name.
pub fn expand_filename(template: &str, job: &str, timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    template
        .replace("{job}", job)
        .replace("{timestamp}", &timestamp.format("%Y%m%d_%H%M%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC_JOB: &str = r#"
[job]
name = "hire-workers"

[source]
input = "data/workers.csv"

[[mappings]]
column = "Dept"
lookup = "mappings/dept.csv"

[[mappings]]
query = "SELECT * FROM input_table WHERE EMPLID <> ''"

[webservice]
id = "Hire_Employee"
catalog = "catalog.toml"
template = "hire_worker.xml"

[webservice.binding]
EmployeeId = "EMPLID"
Department = "Dept"

[endpoint]
url = "https://wd.example.com/ccx/service/acme/Human_Resources"
username = "isu_hr"
password = "secret"
"#;

    #[test]
    fn test_parse_job_with_defaults() {
        let config = JobConfig::from_toml_str(BASIC_JOB).unwrap();

        assert_eq!(config.job.name, "hire-workers");
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[0].unmatched, UnmatchedPolicy::PassThrough);
        assert_eq!(config.webservice.templates_dir, "templates");
        assert!(config.webservice.escape_values);
        assert_eq!(config.webservice.binding["Department"], "Dept");
        assert!(config.dispatch.stop_on_auth_failure);
        assert_eq!(config.output.report_filename, "send_report_{timestamp}.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("HR_CONVERT_TEST_PASSWORD", "from-env");
        let content = BASIC_JOB.replace("\"secret\"", "\"${HR_CONVERT_TEST_PASSWORD}\"");

        let config = JobConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.endpoint.password, "from-env");

        std::env::remove_var("HR_CONVERT_TEST_PASSWORD");
    }

    #[test]
    fn test_unset_env_var_fails_validation() {
        let content = BASIC_JOB.replace("\"secret\"", "\"${HR_CONVERT_UNSET_VARIABLE}\"");
        let config = JobConfig::from_toml_str(&content).unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConvertError::InvalidConfigValue { field, .. }) if field == "endpoint.password"
        ));
    }

    #[test]
    fn test_mapping_step_needs_one_kind() {
        let content = BASIC_JOB.replace(
            "query = \"SELECT * FROM input_table WHERE EMPLID <> ''\"",
            "column = \"Dept\"",
        );
        let config = JobConfig::from_toml_str(&content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConvertError::InvalidConfigValue { field, .. }) if field == "mappings[1]"
        ));
    }

    #[test]
    fn test_invalid_endpoint_url() {
        let content = BASIC_JOB.replace(
            "https://wd.example.com/ccx/service/acme/Human_Resources",
            "wd.example.com",
        );
        let config = JobConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = JobConfig::from_toml_str(BASIC_JOB).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC_JOB.as_bytes()).unwrap();

        let config = JobConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.webservice.id, "Hire_Employee");
    }

    #[test]
    fn test_expand_filename() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 5).unwrap();
        assert_eq!(
            expand_filename("{job}_report_{timestamp}.csv", "hire", &at),
            "hire_report_20240301_083005.csv"
        );
    }
}
