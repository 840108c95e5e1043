use crate::core::mapper::ColumnMapper;
use crate::domain::model::{Dataset, FieldBinding, MappingRule};
use crate::domain::ports::FieldCatalog;
use crate::utils::error::{ConvertError, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct MappingStep {
    description: String,
    dataset: Dataset,
}

/// Mapping state of a conversion: the original table plus one version per applied rule.
///
/// The chain is a value. `apply` and `undo` return new chains and leave `self` as it
/// was, so a rejected rule can never damage the current table.
#[derive(Debug, Clone)]
pub struct MappingChain {
    original: Dataset,
    steps: Vec<MappingStep>,
}

impl MappingChain {
    pub fn new(original: Dataset) -> Self {
        Self {
            original,
            steps: Vec::new(),
        }
    }

    pub fn original(&self) -> &Dataset {
        &self.original
    }

    pub fn current(&self) -> &Dataset {
        self.steps
            .last()
            .map(|step| &step.dataset)
            .unwrap_or(&self.original)
    }

    /// Number of rules applied on top of the original table.
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.description.as_str())
    }

    pub fn apply(&self, mapper: &ColumnMapper, rule: &MappingRule) -> Result<Self> {
        let dataset = mapper.apply(self.current(), rule)?;
        let description = rule.describe();
        tracing::info!(
            "🔧 Applied {}: {} -> {} rows",
            description,
            self.current().len(),
            dataset.len()
        );

        let mut next = self.clone();
        next.steps.push(MappingStep {
            description,
            dataset,
        });
        Ok(next)
    }

    /// The chain without its latest step, or `None` when nothing has been applied.
    pub fn undo(&self) -> Option<Self> {
        if self.steps.is_empty() {
            return None;
        }
        let mut previous = self.clone();
        previous.steps.pop();
        Some(previous)
    }
}

/// Fresh, empty binding for a catalog webservice. Nothing carries over from
/// a binding made for another webservice.
pub fn bind_webservice<C: FieldCatalog>(catalog: &C, id: &str) -> Result<FieldBinding> {
    let descriptor = catalog.descriptor(id)?;
    Ok(FieldBinding::for_descriptor(&descriptor))
}

/// Builds a complete binding for `id` from field -> column pairs, checking every
/// column against `dataset`.
pub fn build_binding<C: FieldCatalog>(
    catalog: &C,
    id: &str,
    pairs: &BTreeMap<String, String>,
    dataset: &Dataset,
) -> Result<FieldBinding> {
    let mut binding = bind_webservice(catalog, id)?;
    for (field, column) in pairs {
        if !dataset.has_column(column) {
            return Err(ConvertError::UnknownColumn {
                column: column.clone(),
            });
        }
        binding.bind(field, column)?;
    }
    binding.ensure_complete()?;
    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::catalog::StaticCatalog;
    use crate::domain::model::{LookupMapping, QueryTransform, Record, WebserviceDescriptor};

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["EMPLID".to_string(), "Dept".to_string()],
            vec![
                Record::from_pairs([("EMPLID", "E1"), ("Dept", "10")]),
                Record::from_pairs([("EMPLID", "E2"), ("Dept", "99")]),
            ],
        )
        .unwrap()
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            WebserviceDescriptor {
                id: "Hire_Employee".to_string(),
                name: "Hire Employee".to_string(),
                fields: vec!["EmployeeId".to_string(), "Department".to_string()],
            },
            WebserviceDescriptor {
                id: "Change_Job".to_string(),
                name: "Change Job".to_string(),
                fields: vec!["EmployeeId".to_string(), "JobCode".to_string()],
            },
        ])
        .unwrap()
    }

    fn dept_rule() -> MappingRule {
        MappingRule::Lookup {
            column: "Dept".to_string(),
            mapping: LookupMapping::from_pairs([("10", "Finance")]).unwrap(),
        }
    }

    #[test]
    fn test_apply_keeps_previous_versions() {
        let chain = MappingChain::new(dataset());
        let mapped = chain.apply(&ColumnMapper::new(), &dept_rule()).unwrap();

        assert_eq!(chain.depth(), 0);
        assert_eq!(mapped.depth(), 1);
        assert_eq!(mapped.original(), &dataset());
        assert_eq!(mapped.current().record(0).unwrap().get("Dept"), Some("Finance"));
        assert_eq!(mapped.current().record(1).unwrap().get("Dept"), Some("99"));
        assert_eq!(mapped.history().count(), 1);

        let undone = mapped.undo().unwrap();
        assert_eq!(undone.current(), &dataset());
        assert!(undone.undo().is_none());
    }

    #[test]
    fn test_rejected_rule_leaves_chain_unchanged() {
        let chain = MappingChain::new(dataset())
            .apply(&ColumnMapper::new(), &dept_rule())
            .unwrap();
        let bad = MappingRule::Query(QueryTransform::new("SELECT Missing FROM input_table"));

        assert!(chain.apply(&ColumnMapper::new(), &bad).is_err());
        assert_eq!(chain.depth(), 1);
        assert_eq!(chain.current().record(0).unwrap().get("Dept"), Some("Finance"));
    }

    #[test]
    fn test_rebinding_starts_from_scratch() {
        let catalog = catalog();
        let mut hire = bind_webservice(&catalog, "Hire_Employee").unwrap();
        hire.bind("EmployeeId", "EMPLID").unwrap();
        hire.bind("Department", "Dept").unwrap();
        assert!(hire.ensure_complete().is_ok());

        let change = bind_webservice(&catalog, "Change_Job").unwrap();
        assert!(change.is_empty());
        assert_eq!(change.webservice(), "Change_Job");
        assert_eq!(change.missing_fields(), vec!["EmployeeId", "JobCode"]);
    }

    #[test]
    fn test_build_binding_checks_columns_and_completeness() {
        let catalog = catalog();
        let mut pairs = BTreeMap::new();
        pairs.insert("EmployeeId".to_string(), "EMPLID".to_string());

        assert!(matches!(
            build_binding(&catalog, "Hire_Employee", &pairs, &dataset()),
            Err(ConvertError::UnboundField { .. })
        ));

        pairs.insert("Department".to_string(), "DEPTID".to_string());
        assert!(matches!(
            build_binding(&catalog, "Hire_Employee", &pairs, &dataset()),
            Err(ConvertError::UnknownColumn { column }) if column == "DEPTID"
        ));

        pairs.insert("Department".to_string(), "Dept".to_string());
        let binding = build_binding(&catalog, "Hire_Employee", &pairs, &dataset()).unwrap();
        assert_eq!(binding.column_for("Department"), Some("Dept"));
    }
}
