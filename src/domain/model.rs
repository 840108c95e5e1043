use crate::utils::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// One row of the legacy table. Cells are text; a missing key means the row has no such cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, String>,
}

impl Record {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.data.get(column).map(String::as_str)
    }
}

/// Immutable, ordered table. Clones share storage, so keeping older versions around is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    columns: Arc<Vec<String>>,
    records: Arc<Vec<Record>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ConvertError::mapping(format!(
                    "duplicate column '{}'",
                    column
                )));
            }
        }

        for (index, record) in records.iter().enumerate() {
            if let Some(extra) = record.data.keys().find(|k| !seen.contains(k.as_str())) {
                return Err(ConvertError::mapping(format!(
                    "row {} has a cell for undeclared column '{}'",
                    index, extra
                )));
            }
        }

        Ok(Self {
            columns: Arc::new(columns),
            records: Arc::new(records),
        })
    }

    pub fn empty() -> Self {
        Self {
            columns: Arc::new(Vec::new()),
            records: Arc::new(Vec::new()),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn record(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Same columns, new rows. Used by mappings that rewrite cells in place.
    pub(crate) fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            columns: Arc::clone(&self.columns),
            records: Arc::new(records),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Values without a lookup entry keep their original text.
    #[default]
    PassThrough,
    /// Values without a lookup entry become the empty string.
    Empty,
}

/// Explicit source value -> target value table for one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupMapping {
    entries: HashMap<String, String>,
    unmatched: UnmatchedPolicy,
}

impl LookupMapping {
    /// Builds a table from (source, target) rows. The same source with two different
    /// targets is rejected; repeating an identical row is fine.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: HashMap<String, String> = HashMap::new();
        for (source, target) in pairs {
            let (source, target) = (source.into(), target.into());
            match entries.get(&source) {
                Some(existing) if *existing != target => {
                    return Err(ConvertError::mapping(format!(
                        "lookup value '{}' maps to both '{}' and '{}'",
                        source, existing, target
                    )));
                }
                _ => {
                    entries.insert(source, target);
                }
            }
        }

        Ok(Self {
            entries,
            unmatched: UnmatchedPolicy::default(),
        })
    }

    pub fn with_policy(mut self, unmatched: UnmatchedPolicy) -> Self {
        self.unmatched = unmatched;
        self
    }

    pub fn unmatched(&self) -> UnmatchedPolicy {
        self.unmatched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn translate(&self, value: &str) -> String {
        match (self.entries.get(value), self.unmatched) {
            (Some(target), _) => target.clone(),
            (None, UnmatchedPolicy::PassThrough) => value.to_string(),
            (None, UnmatchedPolicy::Empty) => String::new(),
        }
    }
}

/// SQL `SELECT` over the current table, exposed as `input_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTransform {
    pub sql: String,
}

impl QueryTransform {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingRule {
    Lookup {
        column: String,
        mapping: LookupMapping,
    },
    Query(QueryTransform),
}

impl MappingRule {
    pub fn describe(&self) -> String {
        match self {
            MappingRule::Lookup { column, mapping } => {
                format!("lookup on '{}' ({} entries)", column, mapping.len())
            }
            MappingRule::Query(query) => format!("query `{}`", query.sql.trim()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebserviceDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub fields: Vec<String>,
}

/// Webservice field name -> dataset column name, for one webservice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBinding {
    webservice: String,
    required: Vec<String>,
    entries: BTreeMap<String, String>,
}

impl FieldBinding {
    /// Empty binding that only accepts the descriptor's fields.
    pub fn for_descriptor(descriptor: &WebserviceDescriptor) -> Self {
        Self {
            webservice: descriptor.id.clone(),
            required: descriptor.fields.clone(),
            entries: BTreeMap::new(),
        }
    }

    /// Free-form binding with no required field list.
    pub fn from_pairs<K, V>(webservice: &str, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            webservice: webservice.to_string(),
            required: Vec::new(),
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn bind(&mut self, field: &str, column: &str) -> Result<()> {
        if !self.required.is_empty() && !self.required.iter().any(|f| f == field) {
            return Err(ConvertError::config(format!(
                "field '{}' is not part of webservice '{}'",
                field, self.webservice
            )));
        }
        self.entries.insert(field.to_string(), column.to_string());
        Ok(())
    }

    pub fn webservice(&self) -> &str {
        &self.webservice
    }

    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.entries.get(field).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Required fields that have no column yet, in descriptor order.
    pub fn missing_fields(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|f| !self.entries.contains_key(f.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn ensure_complete(&self) -> Result<()> {
        match self.missing_fields().first() {
            Some(field) => Err(ConvertError::UnboundField {
                placeholder: field.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// A loaded template. `placeholders` lists each distinct token once, in order of first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub body: String,
    pub placeholders: Vec<String>,
}

/// Rendered request body for exactly one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: String,
}

impl Payload {
    pub fn as_str(&self) -> &str {
        &self.body
    }
}

/// Status used when no HTTP response exists for a record.
pub const NO_STATUS: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Delivered,
    Rejected,
    RenderFailed,
    TransportFailed,
    Skipped,
}

impl SendOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SendOutcome::Delivered => "delivered",
            SendOutcome::Rejected => "rejected",
            SendOutcome::RenderFailed => "render_failed",
            SendOutcome::TransportFailed => "transport_failed",
            SendOutcome::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub record_index: usize,
    pub status_code: u16,
    pub outcome: SendOutcome,
    pub response_body: String,
}

impl SendResult {
    pub fn from_response(record_index: usize, status_code: u16, response_body: String) -> Self {
        let outcome = if (200..300).contains(&status_code) {
            SendOutcome::Delivered
        } else {
            SendOutcome::Rejected
        };
        Self {
            record_index,
            status_code,
            outcome,
            response_body,
        }
    }

    pub fn failed(record_index: usize, outcome: SendOutcome, message: String) -> Self {
        Self {
            record_index,
            status_code: NO_STATUS,
            outcome,
            response_body: message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept_dataset() -> Dataset {
        Dataset::new(
            vec!["EmployeeId".to_string(), "Dept".to_string()],
            vec![
                Record::from_pairs([("EmployeeId", "E1"), ("Dept", "10")]),
                Record::from_pairs([("EmployeeId", "E2")]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_dataset_rejects_duplicate_columns() {
        let result = Dataset::new(vec!["Dept".to_string(), "Dept".to_string()], vec![]);
        assert!(matches!(result, Err(ConvertError::Mapping { .. })));
    }

    #[test]
    fn test_dataset_rejects_undeclared_cells() {
        let result = Dataset::new(
            vec!["Dept".to_string()],
            vec![Record::from_pairs([("Location", "HQ")])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_dataset_allows_missing_cells() {
        let dataset = dept_dataset();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.record(1).unwrap().get("Dept"), None);
        assert!(dataset.has_column("Dept"));
    }

    #[test]
    fn test_lookup_rejects_conflicting_duplicates() {
        assert!(LookupMapping::from_pairs([("10", "Finance"), ("10", "Finance")]).is_ok());
        assert!(LookupMapping::from_pairs([("10", "Finance"), ("10", "Sales")]).is_err());
    }

    #[test]
    fn test_lookup_policies() {
        let mapping = LookupMapping::from_pairs([("10", "Finance")]).unwrap();
        assert_eq!(mapping.translate("10"), "Finance");
        assert_eq!(mapping.translate("99"), "99");

        let strict = mapping.with_policy(UnmatchedPolicy::Empty);
        assert_eq!(strict.translate("99"), "");
    }

    #[test]
    fn test_binding_for_descriptor_rejects_unknown_field() {
        let descriptor = WebserviceDescriptor {
            id: "Hire_Employee".to_string(),
            name: "Hire Employee".to_string(),
            fields: vec!["EmployeeId".to_string(), "Department".to_string()],
        };
        let mut binding = FieldBinding::for_descriptor(&descriptor);
        binding.bind("EmployeeId", "EMPLID").unwrap();
        assert!(binding.bind("Salary", "PAY").is_err());

        assert_eq!(binding.missing_fields(), vec!["Department"]);
        assert!(matches!(
            binding.ensure_complete(),
            Err(ConvertError::UnboundField { placeholder }) if placeholder == "Department"
        ));

        binding.bind("Department", "DEPTID").unwrap();
        assert!(binding.ensure_complete().is_ok());
    }

    #[test]
    fn test_send_result_from_response() {
        assert_eq!(
            SendResult::from_response(0, 200, String::new()).outcome,
            SendOutcome::Delivered
        );
        assert_eq!(
            SendResult::from_response(0, 500, String::new()).outcome,
            SendOutcome::Rejected
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("isu_hr", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("isu_hr"));
        assert!(!printed.contains("hunter2"));
    }
}
