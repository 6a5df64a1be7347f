//! PDF renderer: a cover page, then each section's KPIs and a paginated table.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use super::{report_filename, RenderError, Renderer};
use crate::domain::models::{RenderedArtifact, ReportData, ReportFormat, Section};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
const LINE_HEIGHT: f32 = 6.0;
const BODY_SIZE: f32 = 9.0;
const CELL_MAX_CHARS: usize = 24;

pub struct PdfRenderer;

fn pdf_error(e: impl std::fmt::Debug) -> RenderError {
    RenderError::Pdf(format!("{e:?}"))
}

/// Writes lines top to bottom, starting a new page when one fills up.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "content");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_room(&mut self, lines: f32) {
        if self.y - lines * LINE_HEIGHT < MARGIN {
            self.new_page();
        }
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.ensure_room(1.0);
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
        self.y -= LINE_HEIGHT * (size / BODY_SIZE).max(1.0);
    }

    fn row(&mut self, cells: &[String], bold: bool) {
        self.ensure_room(1.0);
        let usable = PAGE_WIDTH - 2.0 * MARGIN;
        #[allow(clippy::cast_precision_loss)]
        let width = usable / cells.len().max(1) as f32;
        let font = if bold { &self.bold } else { &self.regular };
        for (i, cell) in cells.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let x = MARGIN + width * i as f32;
            self.layer.use_text(truncate(cell), BODY_SIZE, Mm(x), Mm(self.y), font);
        }
        self.y -= LINE_HEIGHT;
    }

    fn gap(&mut self) {
        self.y -= LINE_HEIGHT;
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= CELL_MAX_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(CELL_MAX_CHARS - 1).collect();
    cut.push('~');
    cut
}

fn write_section(writer: &mut PageWriter, section: &Section) {
    writer.new_page();
    writer.line(&section.title, 14.0, true);
    writer.gap();

    for kpi in &section.kpis {
        writer.line(&format!("{}: {}", kpi.label, kpi.display_value()), BODY_SIZE + 1.0, false);
    }
    if !section.kpis.is_empty() {
        writer.gap();
    }

    writer.row(&section.headers, true);
    for cells in &section.rows {
        if writer.y - LINE_HEIGHT < MARGIN {
            writer.new_page();
            writer.row(&section.headers, true);
        }
        let cells: Vec<String> = cells.iter().map(ToString::to_string).collect();
        writer.row(&cells, false);
    }
    if section.rows.is_empty() {
        writer.line("No data in this window.", BODY_SIZE, false);
    }
}

fn build_document(data: &ReportData) -> Result<Vec<u8>, RenderError> {
    let (doc, page, layer) = PdfDocument::new(data.title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "cover");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut writer = PageWriter {
        doc,
        layer,
        regular,
        bold,
        y: PAGE_HEIGHT - 3.0 * MARGIN,
    };

    writer.line(&data.title, 22.0, true);
    writer.gap();
    writer.line(
        &format!(
            "Window: {} to {}",
            data.window.start.format("%Y-%m-%d %H:%M UTC"),
            data.window.end.format("%Y-%m-%d %H:%M UTC")
        ),
        11.0,
        false,
    );
    writer.line(
        &format!("Generated: {}", data.generated_at.format("%Y-%m-%d %H:%M UTC")),
        11.0,
        false,
    );
    if !data.failures.is_empty() {
        writer.gap();
        writer.line("Sections not available:", 11.0, true);
        for failure in &data.failures {
            writer.line(&format!("{}: {}", failure.aggregator.as_str(), failure.error), BODY_SIZE, false);
        }
    }

    for section in &data.sections {
        write_section(&mut writer, section);
    }

    writer.doc.save_to_bytes().map_err(pdf_error)
}

impl Renderer for PdfRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Pdf
    }

    fn render(&self, data: &ReportData) -> Result<RenderedArtifact, RenderError> {
        Ok(RenderedArtifact {
            bytes: build_document(data)?,
            mime_type: "application/pdf".to_string(),
            filename: report_filename(&data.title, data.generated_at, "pdf"),
        })
    }
}
