use crate::core::template::{render, ValueEscape};
use crate::domain::model::{
    Credentials, Dataset, FieldBinding, SendOutcome, SendResult, Template, NO_STATUS,
};
use crate::domain::ports::Transport;
use crate::utils::error::{ConvertError, Result};
use crate::utils::validation::validate_url;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative stop signal, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// After a 401/403, mark the remaining records as skipped instead of sending them.
    pub stop_on_auth_failure: bool,
    pub escape: ValueEscape,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            stop_on_auth_failure: true,
            escape: ValueEscape::default(),
        }
    }
}

/// Inputs of one batch. The dispatcher owns them for the whole run, so the
/// template and binding cannot change while records are being sent.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub endpoint: String,
    pub credentials: Credentials,
    pub template: Template,
    pub binding: FieldBinding,
    pub dataset: Dataset,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<SendResult>,
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    fn new(results: Vec<SendResult>, cancelled: bool, elapsed: Duration) -> Self {
        let delivered = results.iter().filter(|r| r.is_success()).count();
        let skipped = results
            .iter()
            .filter(|r| r.outcome == SendOutcome::Skipped)
            .count();
        let failed = results.len() - delivered - skipped;
        Self {
            results,
            delivered,
            failed,
            skipped,
            cancelled,
            elapsed,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_delivered(&self) -> bool {
        !self.cancelled && self.delivered == self.results.len()
    }
}

/// Renders and submits one payload per record, strictly in row order.
pub struct Dispatcher<T: Transport> {
    transport: T,
    options: DispatchOptions,
    cancel: CancelFlag,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            options: DispatchOptions::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Checks the batch setup and returns a lazy sequence of results.
    ///
    /// Setup problems (bad endpoint, incomplete binding, template placeholders
    /// with no binding) fail here, before anything is sent.
    pub fn start(&self, request: BatchRequest) -> Result<Batch<'_, T>> {
        validate_url("endpoint", &request.endpoint)?;
        request.binding.ensure_complete()?;
        if let Some(placeholder) = request.template.unbound_placeholders(&request.binding).first()
        {
            return Err(ConvertError::UnboundField {
                placeholder: placeholder.to_string(),
            });
        }

        tracing::info!(
            "🚀 Sending {} records with template '{}' to {}",
            request.dataset.len(),
            request.template.name,
            request.endpoint
        );

        Ok(Batch {
            dispatcher: self,
            request,
            next_index: 0,
            auth_rejected: None,
            cancelled: false,
        })
    }

    /// Drains a whole batch. A completed batch has exactly one result per record.
    pub async fn send_all(&self, request: BatchRequest) -> Result<BatchReport> {
        let started = Instant::now();
        let mut batch = self.start(request)?;
        let total = batch.len();
        let mut results = Vec::with_capacity(total);

        while let Some(result) = batch.next().await {
            match result.outcome {
                SendOutcome::Delivered => tracing::debug!(
                    "✅ Record {}/{}: status {}",
                    result.record_index + 1,
                    total,
                    result.status_code
                ),
                SendOutcome::Skipped => {}
                _ => tracing::warn!(
                    "⚠️ Record {}/{}: {} (status {}): {}",
                    result.record_index + 1,
                    total,
                    result.outcome,
                    result.status_code,
                    result.response_body
                ),
            }
            results.push(result);
        }

        let report = BatchReport::new(results, batch.is_cancelled(), started.elapsed());
        tracing::info!(
            "📊 Batch finished: {} delivered, {} failed, {} skipped in {:?}",
            report.delivered,
            report.failed,
            report.skipped,
            report.elapsed
        );
        Ok(report)
    }
}

/// A batch in progress. Each call to `next` handles one record; it is not resumable
/// once dropped, start a new batch with the same inputs instead.
pub struct Batch<'a, T: Transport> {
    dispatcher: &'a Dispatcher<T>,
    request: BatchRequest,
    next_index: usize,
    auth_rejected: Option<u16>,
    cancelled: bool,
}

impl<T: Transport> Batch<'_, T> {
    pub fn len(&self) -> usize {
        self.request.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.dataset.is_empty()
    }

    /// Index of the next record to be handled.
    pub fn position(&self) -> usize {
        self.next_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub async fn next(&mut self) -> Option<SendResult> {
        if self.next_index >= self.len() {
            return None;
        }
        if self.dispatcher.cancel.is_cancelled() {
            if !self.cancelled {
                tracing::warn!(
                    "🛑 Batch cancelled before record {} of {}",
                    self.next_index + 1,
                    self.len()
                );
                self.cancelled = true;
            }
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;

        if let Some(status) = self.auth_rejected {
            return Some(SendResult::failed(
                index,
                SendOutcome::Skipped,
                format!("not sent: endpoint rejected the credentials with status {}", status),
            ));
        }

        let record = self.request.dataset.record(index)?;
        let payload = match render(
            &self.request.template,
            &self.request.binding,
            record,
            self.dispatcher.options.escape,
        ) {
            Ok(payload) => payload,
            Err(e) => return Some(SendResult::failed(index, SendOutcome::RenderFailed, e.to_string())),
        };

        let submitted = self
            .dispatcher
            .transport
            .submit(&self.request.endpoint, &self.request.credentials, &payload)
            .await;

        match submitted {
            Ok(response) => {
                if self.dispatcher.options.stop_on_auth_failure
                    && matches!(response.status_code, 401 | 403)
                {
                    tracing::error!(
                        "🔒 Endpoint answered {} for record {}; remaining records will not be sent",
                        response.status_code,
                        index + 1
                    );
                    self.auth_rejected = Some(response.status_code);
                }
                Some(SendResult::from_response(
                    index,
                    response.status_code,
                    response.body,
                ))
            }
            Err(e) => Some(SendResult {
                record_index: index,
                status_code: NO_STATUS,
                outcome: SendOutcome::TransportFailed,
                response_body: e.to_string(),
            }),
        }
    }
}
