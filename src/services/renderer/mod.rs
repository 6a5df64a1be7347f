//! Format renderers.
//!
//! A renderer turns collected [`ReportData`] into one file. Rendering is
//! CPU-bound and runs on the blocking pool.

mod csv;
mod pdf;
mod xlsx;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use self::csv::CsvRenderer;
pub use self::pdf::PdfRenderer;
pub use self::xlsx::XlsxRenderer;

use crate::domain::models::{RenderedArtifact, ReportData, ReportFormat};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no renderer registered for format '{0}'")]
    UnsupportedFormat(&'static str),

    #[error("csv rendering failed: {0}")]
    Csv(String),

    #[error("zip packaging failed: {0}")]
    Zip(String),

    #[error("xlsx rendering failed: {0}")]
    Xlsx(String),

    #[error("pdf rendering failed: {0}")]
    Pdf(String),

    #[error("renderer task aborted: {0}")]
    Aborted(String),
}

pub trait Renderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    fn render(&self, data: &ReportData) -> Result<RenderedArtifact, RenderError>;
}

/// Renderers keyed by output format, built once at start-up.
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: HashMap<ReportFormat, Arc<dyn Renderer>>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererRegistry {
    /// Registry with the csv, xlsx and pdf renderers.
    pub fn new() -> Self {
        let mut registry = Self {
            renderers: HashMap::new(),
        };
        registry.register(Arc::new(CsvRenderer));
        registry.register(Arc::new(XlsxRenderer));
        registry.register(Arc::new(PdfRenderer));
        registry
    }

    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        self.renderers.insert(renderer.format(), renderer);
    }

    /// Render on the blocking pool.
    pub async fn render(
        &self,
        format: ReportFormat,
        data: Arc<ReportData>,
    ) -> Result<RenderedArtifact, RenderError> {
        let renderer = self
            .renderers
            .get(&format)
            .cloned()
            .ok_or(RenderError::UnsupportedFormat(format.as_str()))?;

        tokio::task::spawn_blocking(move || renderer.render(&data))
            .await
            .map_err(|e| RenderError::Aborted(e.to_string()))?
    }
}

/// Lowercase ASCII slug of a report title, words joined by `_`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug.to_string()
    }
}

/// `{title_slug}_{yyyymmdd}_{hhmm}.{ext}`
pub fn report_filename(title: &str, generated_at: DateTime<Utc>, extension: &str) -> String {
    format!("{}_{}.{extension}", slugify(title), generated_at.format("%Y%m%d_%H%M"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slug_and_filename() {
        assert_eq!(slugify("Daily Production"), "daily_production");
        assert_eq!(slugify("  Q4 / Cost -- Report!  "), "q4_cost_report");
        assert_eq!(slugify("???"), "report");

        let at = Utc.with_ymd_and_hms(2025, 1, 2, 6, 5, 59).unwrap();
        assert_eq!(report_filename("Daily Production", at, "zip"), "daily_production_20250102_0605.zip");
    }

    #[tokio::test]
    async fn test_registry_covers_every_format() {
        let registry = RendererRegistry::new();
        let data = Arc::new(fixtures::report(1));
        for format in ReportFormat::ALL {
            let artifact = registry.render(format, data.clone()).await.unwrap();
            assert!(!artifact.bytes.is_empty(), "{format:?} produced no bytes");
        }
    }
}
