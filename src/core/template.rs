use crate::domain::model::{FieldBinding, Payload, Record, Template};
use crate::domain::ports::Storage;
use crate::utils::error::{ConvertError, Result};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
});

/// How bound cell values are written into the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueEscape {
    /// Escape `& < > " '` so a value cannot break the surrounding XML.
    #[default]
    Xml,
    /// Insert values verbatim.
    None,
}

impl Template {
    /// Wraps a document body and records its `{{Field}}` placeholders.
    pub fn parse(name: &str, body: String) -> Self {
        let mut placeholders: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&body) {
            let field = &caps[1];
            if !placeholders.iter().any(|p| p == field) {
                placeholders.push(field.to_string());
            }
        }

        Self {
            name: name.to_string(),
            body,
            placeholders,
        }
    }

    /// Placeholders that `binding` does not cover, in template order.
    pub fn unbound_placeholders<'a>(&'a self, binding: &FieldBinding) -> Vec<&'a str> {
        self.placeholders
            .iter()
            .filter(|p| binding.column_for(p).is_none())
            .map(String::as_str)
            .collect()
    }
}

/// Substitutes `record`'s bound values into `template`.
///
/// Fails with `UnboundField` when a placeholder has no binding entry and with
/// `Binding` when a bound column is missing from the record. The output depends
/// only on the inputs, and substituted text is never scanned again for placeholders.
pub fn render(
    template: &Template,
    binding: &FieldBinding,
    record: &Record,
    escape: ValueEscape,
) -> Result<Payload> {
    if let Some(placeholder) = template.unbound_placeholders(binding).first() {
        return Err(ConvertError::UnboundField {
            placeholder: placeholder.to_string(),
        });
    }

    for (field, column) in binding.entries() {
        if record.get(column).is_none() {
            return Err(ConvertError::Binding {
                field: field.to_string(),
                column: column.to_string(),
            });
        }
    }

    let body = PLACEHOLDER.replace_all(&template.body, |caps: &Captures| {
        let value = binding
            .column_for(&caps[1])
            .and_then(|column| record.get(column))
            .unwrap_or_default();
        match escape {
            ValueEscape::Xml => escape_xml(value),
            ValueEscape::None => value.to_string(),
        }
    });

    Ok(Payload {
        body: body.into_owned(),
    })
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Loads named templates from a directory of a `Storage` and renders them.
pub struct TemplateEngine<S: Storage> {
    storage: S,
    directory: String,
    escape: ValueEscape,
}

impl<S: Storage> TemplateEngine<S> {
    pub fn new(storage: S, directory: impl Into<String>) -> Self {
        Self {
            storage,
            directory: directory.into(),
            escape: ValueEscape::default(),
        }
    }

    pub fn with_escape(mut self, escape: ValueEscape) -> Self {
        self.escape = escape;
        self
    }

    pub async fn load(&self, name: &str) -> Result<Template> {
        let not_found = || ConvertError::TemplateNotFound {
            name: name.to_string(),
        };

        if name.trim().is_empty() || name.contains("..") || Path::new(name).is_absolute() {
            return Err(not_found());
        }

        let path = if self.directory.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.directory.trim_end_matches('/'), name)
        };

        let bytes = match self.storage.read_file(&path).await {
            Ok(bytes) => bytes,
            Err(ConvertError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found())
            }
            Err(e) => return Err(e),
        };

        let body = String::from_utf8(bytes).map_err(|_| {
            ConvertError::config(format!("template '{}' is not valid UTF-8", name))
        })?;

        let template = Template::parse(name, body);
        tracing::debug!(
            "📄 Loaded template '{}' with placeholders {:?}",
            name,
            template.placeholders
        );
        Ok(template)
    }

    pub fn render(
        &self,
        template: &Template,
        binding: &FieldBinding,
        record: &Record,
    ) -> Result<Payload> {
        render(template, binding, record, self.escape)
    }
}
