//! XLSX renderer: a `Summary` sheet of KPIs, then one worksheet per section.

use std::collections::HashSet;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::{report_filename, RenderError, Renderer};
use crate::domain::models::{CellValue, RenderedArtifact, ReportData, ReportFormat};

const SHEET_NAME_MAX_LEN: usize = 31;

pub struct XlsxRenderer;

fn xlsx_error(e: XlsxError) -> RenderError {
    RenderError::Xlsx(e.to_string())
}

/// A worksheet name Excel accepts and that is unique within the workbook.
fn sheet_name(title: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'');
    let base: String = if cleaned.is_empty() { "Section" } else { cleaned }
        .chars()
        .take(SHEET_NAME_MAX_LEN)
        .collect();

    let mut name = base.clone();
    let mut n = 2;
    while !taken.insert(name.to_lowercase()) {
        let suffix = format!(" ({n})");
        let keep = SHEET_NAME_MAX_LEN - suffix.chars().count();
        name = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
        n += 1;
    }
    name
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<(), XlsxError> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        CellValue::Integer(v) => sheet.write_number(row, col, *v as f64).map(|_| ()),
        CellValue::Number(v) => sheet.write_number(row, col, *v).map(|_| ()),
        CellValue::Text(v) => sheet.write_string(row, col, v).map(|_| ()),
        CellValue::Empty => Ok(()),
    }
}

fn build_workbook(data: &ReportData) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let title_format = Format::new().set_bold().set_font_size(14);
    let mut taken = HashSet::new();

    let summary = workbook.add_worksheet();
    summary.set_name(sheet_name("Summary", &mut taken))?;
    summary.write_string_with_format(0, 0, &data.title, &title_format)?;
    summary.write_string(
        1,
        0,
        format!("Window: {} to {}", data.window.start.to_rfc3339(), data.window.end.to_rfc3339()),
    )?;
    summary.write_string(2, 0, format!("Generated: {}", data.generated_at.to_rfc3339()))?;
    summary.write_string_with_format(4, 0, "Section", &bold)?;
    summary.write_string_with_format(4, 1, "KPI", &bold)?;
    summary.write_string_with_format(4, 2, "Value", &bold)?;
    summary.write_string_with_format(4, 3, "Unit", &bold)?;
    let mut row = 5;
    for section in &data.sections {
        for kpi in &section.kpis {
            summary.write_string(row, 0, &section.title)?;
            summary.write_string(row, 1, &kpi.label)?;
            summary.write_number(row, 2, kpi.value)?;
            if let Some(unit) = &kpi.unit {
                summary.write_string(row, 3, unit)?;
            }
            row += 1;
        }
    }
    for failure in &data.failures {
        summary.write_string(row, 0, format!("{} (not available)", failure.aggregator.as_str()))?;
        summary.write_string(row, 1, &failure.error)?;
        row += 1;
    }

    for section in &data.sections {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(&section.title, &mut taken))?;
        sheet.write_string_with_format(0, 0, &section.title, &title_format)?;
        for (col, header) in (0_u16..).zip(&section.headers) {
            sheet.write_string_with_format(1, col, header, &bold)?;
        }
        for (row, cells) in (2_u32..).zip(&section.rows) {
            for (col, cell) in (0_u16..).zip(cells) {
                write_cell(sheet, row, col, cell)?;
            }
        }
    }

    workbook.save_to_buffer()
}

impl Renderer for XlsxRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xlsx
    }

    fn render(&self, data: &ReportData) -> Result<RenderedArtifact, RenderError> {
        Ok(RenderedArtifact {
            bytes: build_workbook(data).map_err(xlsx_error)?,
            mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            filename: report_filename(&data.title, data.generated_at, "xlsx"),
        })
    }
}
