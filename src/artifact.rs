use crate::record::{Record, RowId};
use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Image, Workbook, Worksheet, XlsxError};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub const HEADERS: [&str; 9] = [
    "Rank",
    "ID",
    "Title",
    "Type",
    "Rating",
    "Votes",
    "Popularity",
    "Release Date",
    "Poster",
];
pub const COL_ID: usize = 1;
pub const COL_VOTES: usize = 5;
const COL_POSTER: u16 = 8;
const WIDTHS: [f64; 9] = [8.0, 12.0, 35.0, 10.0, 8.0, 10.0, 12.0, 15.0, 25.0];
const EXTRA_COL_WIDTH: f64 = 45.0;
const POSTER_ROW_HEIGHT: f64 = 90.0;

pub const NA: &str = "N/A";
pub const POSTER_LABEL: &str = "Poster";
pub const NO_POSTER_LABEL: &str = "No Poster";

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub row_id: RowId,
    pub record: Record,
    pub poster: Option<Vec<u8>>,
}

impl ReportRow {
    /// Assigns row ids in order: first record is rank 1, sheet row 2.
    pub fn ranked(records: Vec<Record>) -> Vec<ReportRow> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| ReportRow {
                row_id: RowId::for_rank(i + 1),
                record,
                poster: None,
            })
            .collect()
    }
}

/// Writes a fresh workbook with one row per record. Returns the number of embedded posters.
pub fn write_records(path: &Path, sheet_name: &str, rows: &[ReportRow]) -> Result<usize> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name(sheet_name)?;
    write_header(ws, &HEADERS.map(String::from))?;

    let mut embedded = 0;
    for row in rows {
        let r = row.row_id.index();
        let rec = &row.record;
        ws.write_number(r, 0, r as f64)?;
        ws.write_number(r, 1, rec.id as f64)?;
        write_text_or_na(ws, r, 2, rec.title.as_deref())?;
        ws.write_string(r, 3, rec.kind.label())?;
        write_number_or_na(ws, r, 4, rec.rating)?;
        write_number_or_na(ws, r, 5, rec.votes.map(|v| v as f64))?;
        write_number_or_na(ws, r, 6, rec.popularity)?;
        if !rec.release_date().is_empty() {
            ws.write_string(r, 7, rec.release_date())?;
        }

        let image = row
            .poster
            .as_deref()
            .and_then(|bytes| Image::new_from_buffer(bytes).ok());
        match image {
            Some(image) => {
                ws.write_string(r, COL_POSTER, POSTER_LABEL)?;
                ws.set_row_height(r, POSTER_ROW_HEIGHT)?;
                ws.insert_image_fit_to_cell(r, COL_POSTER, &image, true)?;
                embedded += 1;
            }
            None => {
                ws.write_string(r, COL_POSTER, NO_POSTER_LABEL)?;
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = rows.len(),
        posters = embedded,
        "artifact written"
    );
    Ok(embedded)
}

fn write_header(ws: &mut Worksheet, header: &[String]) -> Result<(), XlsxError> {
    for (col, label) in header.iter().enumerate() {
        let col = col as u16;
        if !label.is_empty() {
            ws.write_string(0, col, label)?;
        }
        let width = WIDTHS.get(col as usize).copied().unwrap_or(EXTRA_COL_WIDTH);
        ws.set_column_width(col, width)?;
    }
    Ok(())
}

fn write_text_or_na(ws: &mut Worksheet, row: u32, col: u16, v: Option<&str>) -> Result<(), XlsxError> {
    ws.write_string(row, col, v.unwrap_or(NA))?;
    Ok(())
}

fn write_number_or_na(ws: &mut Worksheet, row: u32, col: u16, v: Option<f64>) -> Result<(), XlsxError> {
    match v {
        Some(n) if n.is_finite() => ws.write_number(row, col, n)?,
        _ => ws.write_string(row, col, NA)?,
    };
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn from_data(d: &Data) -> Self {
        match d {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Integer view of the cell; anything non-numeric reads as 0.
    pub fn as_i64_lenient(&self) -> i64 {
        match self {
            Cell::Number(f) if f.is_finite() => *f as i64,
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetRow {
    pub row_id: RowId,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    pub fn cell(&self, col: usize) -> &Cell {
        self.cells.get(col).unwrap_or(&Cell::Empty)
    }
}

/// In-memory snapshot of the first worksheet of a workbook.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<SheetRow>,
}

pub fn read_sheet(path: &Path) -> Result<Sheet> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).with_context(|| format!("opening {}", path.display()))?;
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("workbook has no worksheets: {}", path.display()))?;
    let range = workbook
        .worksheet_range(&name)
        .with_context(|| format!("reading worksheet {name:?} of {}", path.display()))?;

    let (row0, col0) = range.start().unwrap_or((0, 0));
    let mut header = Vec::new();
    let mut rows = Vec::new();
    for (i, data) in range.rows().enumerate() {
        let mut cells = vec![Cell::Empty; col0 as usize];
        cells.extend(data.iter().map(Cell::from_data));
        while matches!(cells.last(), Some(Cell::Empty)) {
            cells.pop();
        }

        let index = row0 as usize + i;
        if index == 0 {
            header = cells
                .iter()
                .map(|c| match c {
                    Cell::Text(s) => s.clone(),
                    Cell::Number(n) => n.to_string(),
                    Cell::Empty => String::new(),
                })
                .collect();
            continue;
        }
        if cells.is_empty() {
            continue;
        }
        rows.push(SheetRow {
            row_id: RowId(index as u32 + 1),
            cells,
        });
    }

    debug!(path = %path.display(), sheet = %name, rows = rows.len(), "sheet loaded");
    Ok(Sheet { name, header, rows })
}

/// Sets `label`'s column for every row present in `values`. A missing column is
/// appended after the widest row, so unlabelled data cells are never overwritten.
/// Returns the zero-based column index.
pub fn apply_column(sheet: &mut Sheet, label: &str, values: &BTreeMap<RowId, String>) -> usize {
    let col = match sheet.header.iter().position(|h| h == label) {
        Some(col) => col,
        None => {
            let widest = sheet.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
            let col = sheet.header.len().max(widest);
            sheet.header.resize(col, String::new());
            sheet.header.push(label.to_string());
            col
        }
    };
    for row in &mut sheet.rows {
        if let Some(v) = values.get(&row.row_id) {
            if row.cells.len() <= col {
                row.cells.resize(col + 1, Cell::Empty);
            }
            row.cells[col] = Cell::Text(v.clone());
        }
    }
    col
}

/// Rewrites the workbook from the snapshot. Cell values survive; embedded images do not.
pub fn write_sheet(path: &Path, sheet: &Sheet) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name(&sheet.name)?;
    write_header(ws, &sheet.header)?;
    for row in &sheet.rows {
        let r = row.row_id.index();
        for (col, cell) in row.cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Number(n) => {
                    ws.write_number(r, col, *n)?;
                }
                Cell::Text(s) => {
                    ws.write_string(r, col, s)?;
                }
            }
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), rows = sheet.rows.len(), "artifact updated");
    Ok(())
}
