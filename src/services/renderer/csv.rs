//! CSV renderer: one RFC 4180 table per section, zipped when there are several.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{report_filename, slugify, RenderError, Renderer};
use crate::domain::models::{RenderedArtifact, ReportData, ReportFormat, Section};

pub struct CsvRenderer;

fn section_csv(section: &Section) -> Result<Vec<u8>, RenderError> {
    let mut writer = ::csv::WriterBuilder::new()
        .terminator(::csv::Terminator::CRLF)
        .quote_style(::csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(&section.headers)
        .map_err(|e| RenderError::Csv(e.to_string()))?;
    for row in &section.rows {
        writer
            .write_record(row.iter().map(ToString::to_string))
            .map_err(|e| RenderError::Csv(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| RenderError::Csv(e.to_string()))
}

fn zip_sections(files: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, RenderError> {
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in files {
        archive
            .start_file(name, options)
            .map_err(|e| RenderError::Zip(e.to_string()))?;
        archive
            .write_all(&bytes)
            .map_err(|e| RenderError::Zip(e.to_string()))?;
    }

    let cursor = archive.finish().map_err(|e| RenderError::Zip(e.to_string()))?;
    Ok(cursor.into_inner())
}

impl Renderer for CsvRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Csv
    }

    fn render(&self, data: &ReportData) -> Result<RenderedArtifact, RenderError> {
        if let [section] = data.sections.as_slice() {
            return Ok(RenderedArtifact {
                bytes: section_csv(section)?,
                mime_type: "text/csv".to_string(),
                filename: report_filename(&data.title, data.generated_at, "csv"),
            });
        }

        let files = data
            .sections
            .iter()
            .enumerate()
            .map(|(i, section)| {
                let name = format!("{:02}_{}.csv", i + 1, slugify(&section.title));
                section_csv(section).map(|bytes| (name, bytes))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RenderedArtifact {
            bytes: zip_sections(files)?,
            mime_type: "application/zip".to_string(),
            filename: report_filename(&data.title, data.generated_at, "zip"),
        })
    }
}
