use crate::adapters::table::{
    dataset_from_csv, dataset_to_csv, lookup_from_csv, results_to_csv, results_to_json,
};
use crate::config::job::{expand_filename, JobConfig, MappingStepConfig};
use crate::core::dispatcher::{BatchReport, BatchRequest, CancelFlag, DispatchOptions, Dispatcher};
use crate::core::mapper::ColumnMapper;
use crate::core::pipeline::{build_binding, MappingChain};
use crate::core::template::{TemplateEngine, ValueEscape};
use crate::domain::model::{Dataset, MappingRule, QueryTransform};
use crate::domain::ports::{FieldCatalog, Storage, Transport};
use crate::utils::error::{ConvertError, Result};

/// What a job run produced.
#[derive(Debug)]
pub struct JobOutcome {
    pub input_rows: usize,
    pub mapped: Dataset,
    pub preview: Option<String>,
    pub mapped_path: Option<String>,
    pub report: Option<BatchReport>,
    pub report_path: Option<String>,
}

/// Runs one job file end to end: read, map, bind, render, send, report.
pub struct ConversionJob<S, C, T>
where
    S: Storage + Clone,
    C: FieldCatalog,
    T: Transport,
{
    config: JobConfig,
    storage: S,
    catalog: C,
    mapper: ColumnMapper,
    dispatcher: Dispatcher<T>,
}

impl<S, C, T> ConversionJob<S, C, T>
where
    S: Storage + Clone,
    C: FieldCatalog,
    T: Transport,
{
    pub fn new(config: JobConfig, storage: S, catalog: C, transport: T) -> Self {
        let options = DispatchOptions {
            stop_on_auth_failure: config.dispatch.stop_on_auth_failure,
            escape: escape_for(&config),
        };
        Self {
            config,
            storage,
            catalog,
            mapper: ColumnMapper::new(),
            dispatcher: Dispatcher::new(transport).with_options(options),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.dispatcher = self.dispatcher.with_cancel_flag(cancel);
        self
    }

    pub async fn load_dataset(&self) -> Result<Dataset> {
        let bytes = self.storage.read_file(&self.config.source.input).await?;
        let dataset = dataset_from_csv(&bytes)?;
        tracing::info!(
            "📂 Loaded {} rows x {} columns from {}",
            dataset.len(),
            dataset.columns().len(),
            self.config.source.input
        );
        Ok(dataset)
    }

    /// Applies the configured mapping steps in order. The first failing step stops the job.
    pub async fn apply_mappings(&self, dataset: Dataset) -> Result<MappingChain> {
        let mut chain = MappingChain::new(dataset);
        for (index, step) in self.config.mappings.iter().enumerate() {
            let rule = self.mapping_rule(step).await?;
            chain = chain.apply(&self.mapper, &rule).map_err(|e| {
                tracing::error!("❌ Mapping step {} failed: {}", index + 1, e);
                e
            })?;
        }
        Ok(chain)
    }

    async fn mapping_rule(&self, step: &MappingStepConfig) -> Result<MappingRule> {
        match (&step.column, &step.lookup, &step.query) {
            (Some(column), Some(lookup), None) => {
                let bytes = self.storage.read_file(lookup).await?;
                let mapping = lookup_from_csv(&bytes, step.unmatched)?;
                Ok(MappingRule::Lookup {
                    column: column.clone(),
                    mapping,
                })
            }
            (None, None, Some(query)) => Ok(MappingRule::Query(QueryTransform::new(query.clone()))),
            _ => Err(ConvertError::config(
                "mapping step must set either `column` and `lookup`, or `query`",
            )),
        }
    }

    pub async fn run(&self, dry_run: bool) -> Result<JobOutcome> {
        let started_at = chrono::Utc::now();
        let job_name = self.config.job.name.as_str();
        tracing::info!("🚀 Starting job '{}'", job_name);

        let dataset = self.load_dataset().await?;
        let input_rows = dataset.len();
        let chain = self.apply_mappings(dataset).await?;
        let mapped = chain.current().clone();

        let mapped_path = match &self.config.output.mapped_filename {
            Some(filename) => {
                let path = self.output_file(filename, job_name, &started_at);
                self.storage.write_file(&path, &dataset_to_csv(&mapped)?).await?;
                tracing::info!("💾 Mapped table written to {}", path);
                Some(path)
            }
            None => None,
        };

        let webservice = &self.config.webservice;
        let binding = build_binding(&self.catalog, &webservice.id, &webservice.binding, &mapped)?;
        let engine = TemplateEngine::new(self.storage.clone(), webservice.templates_dir.clone())
            .with_escape(escape_for(&self.config));
        let template = engine.load(&webservice.template).await?;

        let preview = match mapped.record(0) {
            Some(first) => match engine.render(&template, &binding, first) {
                Ok(payload) => Some(payload.body),
                Err(e) => {
                    tracing::warn!("⚠️ First record cannot be rendered: {}", e);
                    None
                }
            },
            None => {
                tracing::warn!("⚠️ The mapped table is empty, nothing to send");
                None
            }
        };

        if dry_run {
            tracing::info!("🔍 Dry run: {} payloads would be sent", mapped.len());
            return Ok(JobOutcome {
                input_rows,
                mapped,
                preview,
                mapped_path,
                report: None,
                report_path: None,
            });
        }

        let request = BatchRequest {
            endpoint: self.config.endpoint.url.clone(),
            credentials: self.config.endpoint.credentials(),
            template,
            binding,
            dataset: mapped.clone(),
        };
        let report = self.dispatcher.send_all(request).await?;

        let report_path =
            self.output_file(&self.config.output.report_filename, job_name, &started_at);
        let report_bytes = if report_path.ends_with(".json") {
            results_to_json(&report.results)?
        } else {
            results_to_csv(&report.results)?
        };
        self.storage.write_file(&report_path, &report_bytes).await?;
        tracing::info!("📁 Send report written to {}", report_path);

        Ok(JobOutcome {
            input_rows,
            mapped,
            preview,
            mapped_path,
            report: Some(report),
            report_path: Some(report_path),
        })
    }

    fn output_file(
        &self,
        filename: &str,
        job: &str,
        at: &chrono::DateTime<chrono::Utc>,
    ) -> String {
        let name = expand_filename(filename, job, at);
        let dir = self.config.output.path.trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            name
        } else {
            format!("{}/{}", dir, name)
        }
    }
}

fn escape_for(config: &JobConfig) -> ValueEscape {
    if config.webservice.escape_values {
        ValueEscape::Xml
    } else {
        ValueEscape::None
    }
}
