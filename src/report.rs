use crate::error::{ActionPlanError, Result};
use crate::schema::{NonConformity, Recommendation, RecommendationStatus, ReportRow};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

pub const CSV_HEADERS: [&str; 4] = [
    "Numéro d'exigence",
    "Correction proposée",
    "Preuves potentielles",
    "Actions correctives",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Text,
    #[cfg(feature = "xlsx")]
    Xlsx,
    #[cfg(feature = "docx")]
    Docx,
    #[cfg(feature = "pdf")]
    Pdf,
}

impl ExportFormat {
    pub fn file_extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Text => "txt",
            #[cfg(feature = "xlsx")]
            ExportFormat::Xlsx => "xlsx",
            #[cfg(feature = "docx")]
            ExportFormat::Docx => "docx",
            #[cfg(feature = "pdf")]
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Text => "text/plain",
            #[cfg(feature = "xlsx")]
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            #[cfg(feature = "docx")]
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            #[cfg(feature = "pdf")]
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Recommendations collected during one run, in processing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub generated_on: NaiveDate,
    rows: Vec<ReportRow>,
}

impl Default for Report {
    fn default() -> Self {
        Self::new("Plan d'actions IFS Food v8")
    }
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            generated_on: Local::now().date_naive(),
            rows: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.generated_on = date;
        self
    }

    pub fn push(&mut self, non_conformity: NonConformity, recommendation: Recommendation) {
        self.rows.push(ReportRow::new(non_conformity, recommendation));
    }

    pub fn push_row(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn count_by_status(&self, status: RecommendationStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Csv => Ok(self.to_csv()?.into_bytes()),
            ExportFormat::Text => Ok(self.to_text().into_bytes()),
            #[cfg(feature = "xlsx")]
            ExportFormat::Xlsx => self.to_xlsx(),
            #[cfg(feature = "docx")]
            ExportFormat::Docx => self.to_docx(),
            #[cfg(feature = "pdf")]
            ExportFormat::Pdf => self.to_pdf(),
        }
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADERS)?;
        for row in &self.rows {
            writer.write_record([
                row.non_conformity.requirement_no.as_str(),
                row.recommendation.correction.as_str(),
                row.recommendation.evidence.as_str(),
                row.recommendation.corrective_action.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ActionPlanError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ActionPlanError::Export(e.to_string()))
    }

    pub fn to_text(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", self.title));
        output.push_str(&format!("Généré le {}\n", self.generated_on.format("%d/%m/%Y")));
        output.push_str(&"=".repeat(60));
        output.push('\n');

        for row in &self.rows {
            output.push('\n');
            output.push_str(&format!(
                "Exigence {} : {}\n",
                row.non_conformity.requirement_no, row.non_conformity.requirement_text
            ));
            if let Some(score) = &row.non_conformity.score {
                output.push_str(&format!("Notation : {}\n", score));
            }
            output.push_str(&format!("Constat : {}\n", row.non_conformity.explanation));
            output.push_str(&format!(
                "\nCorrection immédiate :\n{}\n",
                row.recommendation.correction
            ));
            output.push_str(&format!(
                "\nPreuves requises :\n{}\n",
                row.recommendation.evidence
            ));
            output.push_str(&format!(
                "\nActions correctives :\n{}\n",
                row.recommendation.corrective_action
            ));
            output.push_str(&"-".repeat(60));
            output.push('\n');
        }

        output
    }

    #[cfg(feature = "xlsx")]
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        use rust_xlsxwriter::{Format, Workbook};

        let to_export = |e: rust_xlsxwriter::XlsxError| ActionPlanError::Export(e.to_string());

        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let wrap_format = Format::new().set_text_wrap();
        let worksheet = workbook.add_worksheet();

        for (col, header) in CSV_HEADERS.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, *header, &header_format)
                .map_err(to_export)?;
            let width = if col == 0 { 18.0 } else { 60.0 };
            worksheet.set_column_width(col as u16, width).map_err(to_export)?;
        }

        for (i, row) in self.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            let cells = [
                &row.non_conformity.requirement_no,
                &row.recommendation.correction,
                &row.recommendation.evidence,
                &row.recommendation.corrective_action,
            ];
            for (col, value) in cells.iter().enumerate() {
                worksheet
                    .write_string_with_format(r, col as u16, value.as_str(), &wrap_format)
                    .map_err(to_export)?;
            }
        }

        workbook.save_to_buffer().map_err(to_export)
    }

    #[cfg(feature = "docx")]
    pub fn to_docx(&self) -> Result<Vec<u8>> {
        use docx_rs::{Docx, Paragraph, Run};

        fn heading(text: &str, size: usize) -> Paragraph {
            Paragraph::new().add_run(Run::new().add_text(text).bold().size(size))
        }

        fn body(text: &str) -> Vec<Paragraph> {
            text.lines()
                .map(|line| Paragraph::new().add_run(Run::new().add_text(line)))
                .collect()
        }

        let mut docx = Docx::new()
            .add_paragraph(heading(&self.title, 36))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text(format!(
                "Généré le {}",
                self.generated_on.format("%d/%m/%Y")
            ))));

        for row in &self.rows {
            let nc = &row.non_conformity;
            docx = docx
                .add_paragraph(heading(
                    &format!("Exigence {} : {}", nc.requirement_no, nc.requirement_text),
                    28,
                ))
                .add_paragraph(
                    Paragraph::new().add_run(Run::new().add_text(format!("Constat : {}", nc.explanation))),
                );
            for (title, text) in [
                ("Correction immédiate", &row.recommendation.correction),
                ("Preuves requises", &row.recommendation.evidence),
                ("Actions correctives", &row.recommendation.corrective_action),
            ] {
                docx = docx.add_paragraph(heading(title, 24));
                for paragraph in body(text) {
                    docx = docx.add_paragraph(paragraph);
                }
            }
        }

        let mut buffer = std::io::Cursor::new(Vec::new());
        docx.build()
            .pack(&mut buffer)
            .map_err(|e| ActionPlanError::Export(e.to_string()))?;
        Ok(buffer.into_inner())
    }

    #[cfg(feature = "pdf")]
    pub fn to_pdf(&self) -> Result<Vec<u8>> {
        use printpdf::{BuiltinFont, Mm, PdfDocument};

        const PAGE_WIDTH: f32 = 210.0;
        const PAGE_HEIGHT: f32 = 297.0;
        const MARGIN: f32 = 20.0;
        const LINE_HEIGHT: f32 = 5.0;
        const WRAP_AT: usize = 95;

        let (doc, page, layer) =
            PdfDocument::new(&self.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ActionPlanError::Export(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ActionPlanError::Export(e.to_string()))?;

        let mut current = doc.get_page(page).get_layer(layer);
        let mut y = PAGE_HEIGHT - MARGIN;

        for (line, is_heading) in self.pdf_lines(WRAP_AT) {
            if y < MARGIN {
                let (next_page, next_layer) =
                    doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
                current = doc.get_page(next_page).get_layer(next_layer);
                y = PAGE_HEIGHT - MARGIN;
            }
            if !line.is_empty() {
                let (face, size) = if is_heading { (&bold, 11.0) } else { (&font, 10.0) };
                current.use_text(line, size, Mm(MARGIN), Mm(y), face);
            }
            y -= LINE_HEIGHT;
        }

        doc.save_to_bytes()
            .map_err(|e| ActionPlanError::Export(e.to_string()))
    }

    /// Lines for the paginated layout, each flagged as heading or body.
    #[cfg(feature = "pdf")]
    fn pdf_lines(&self, width: usize) -> Vec<(String, bool)> {
        let mut lines = vec![
            (self.title.clone(), true),
            (format!("Généré le {}", self.generated_on.format("%d/%m/%Y")), false),
            (String::new(), false),
        ];
        for row in &self.rows {
            let nc = &row.non_conformity;
            lines.push((format!("Exigence {} : {}", nc.requirement_no, nc.requirement_text), true));
            for wrapped in wrap_text(&format!("Constat : {}", nc.explanation), width) {
                lines.push((wrapped, false));
            }
            for (title, text) in [
                ("Correction immédiate", &row.recommendation.correction),
                ("Preuves requises", &row.recommendation.evidence),
                ("Actions correctives", &row.recommendation.corrective_action),
            ] {
                lines.push((title.to_string(), true));
                for wrapped in wrap_text(text, width) {
                    lines.push((wrapped, false));
                }
            }
            lines.push((String::new(), false));
        }
        lines
    }
}

/// Greedy word wrap on character count. Words longer than `width` get their own line.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for source_line in text.lines() {
        let mut current = String::new();
        for word in source_line.split_whitespace() {
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        out.push(current);
    }
    out
}
