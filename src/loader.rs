use crate::config::{ColumnMapping, HeaderLocation};
use crate::error::{ActionPlanError, Result};
use crate::schema::NonConformity;
use log::{debug, info};
use std::io::Read;
use std::path::Path;

/// A sheet as rows of cell text. Ragged rows are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Reads every record as a plain row; nothing is treated as a header yet.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(Self { rows })
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Reads the first worksheet of an `.xlsx`/`.xls`/`.ods` workbook.
    #[cfg(feature = "xlsx")]
    pub fn from_workbook_path(path: impl AsRef<Path>) -> Result<Self> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook = open_workbook_auto(path.as_ref())
            .map_err(|e| ActionPlanError::Spreadsheet(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ActionPlanError::Spreadsheet("Workbook has no worksheet".to_string()))?
            .map_err(|e| ActionPlanError::Spreadsheet(e.to_string()))?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        Ok(Self { rows })
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|c| c.trim())
            .unwrap_or("")
    }
}

struct ColumnIndices {
    requirement_no: usize,
    requirement_text: usize,
    score: Option<usize>,
    explanation: usize,
}

fn header_cells(table: &Table, header_row: usize) -> Vec<String> {
    table.rows[header_row]
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn resolve_columns(header: &[String], columns: &ColumnMapping) -> Option<ColumnIndices> {
    let position = |name: &str| header.iter().position(|h| h == name);
    Some(ColumnIndices {
        requirement_no: position(&columns.requirement_no)?,
        requirement_text: position(&columns.requirement_text)?,
        score: columns.score.as_deref().and_then(position),
        explanation: position(&columns.explanation)?,
    })
}

/// Positions are resolved on the raw row so blank header cells keep their column index.
fn raw_header(table: &Table, header_row: usize) -> Vec<String> {
    table.rows[header_row]
        .iter()
        .map(|c| c.trim().to_string())
        .collect()
}

fn locate_header(table: &Table, header: HeaderLocation, columns: &ColumnMapping) -> Result<usize> {
    match header {
        HeaderLocation::Fixed(row) => {
            if row >= table.rows.len() {
                return Err(ActionPlanError::HeaderRowOutOfRange {
                    header_row: row,
                    rows: table.rows.len(),
                });
            }
            Ok(row)
        }
        HeaderLocation::Search { within } => (0..within.min(table.rows.len()))
            .find(|row| resolve_columns(&raw_header(table, *row), columns).is_some())
            .ok_or(ActionPlanError::HeaderNotFound { within }),
    }
}

/// Turns the rows under the header into non-conformities, in sheet order.
///
/// Rows with neither a requirement number nor an explanation are padding and
/// are skipped.
pub fn load_action_plan(
    table: &Table,
    header: HeaderLocation,
    columns: &ColumnMapping,
) -> Result<Vec<NonConformity>> {
    let header_row = locate_header(table, header, columns)?;
    let indices = resolve_columns(&raw_header(table, header_row), columns).ok_or_else(|| {
        ActionPlanError::MissingColumns {
            expected: columns.required().iter().map(|c| c.to_string()).collect(),
            found: header_cells(table, header_row),
        }
    })?;
    debug!(
        "Action plan header found on row {} (requirement column {})",
        header_row, indices.requirement_no
    );

    let mut items = Vec::new();
    for row in (header_row + 1)..table.rows.len() {
        let requirement_no = table.cell(row, indices.requirement_no);
        let explanation = table.cell(row, indices.explanation);
        if requirement_no.is_empty() && explanation.is_empty() {
            continue;
        }

        let score = indices
            .score
            .map(|col| table.cell(row, col))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        items.push(NonConformity {
            requirement_no: requirement_no.to_string(),
            requirement_text: table.cell(row, indices.requirement_text).to_string(),
            score,
            explanation: explanation.to_string(),
        });
    }

    info!("Loaded {} non-conformities from the action plan", items.len());
    Ok(items)
}
