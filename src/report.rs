use crate::{record::RowId, verify::Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestReport {
    pub mode: String,
    pub started: String,
    pub finished: String,
    pub records: usize,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub rows: usize,
    pub posters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalsReport {
    pub movies: u64,
    pub tv: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Percentage, 0..=100.
    pub success_rate: f64,
    pub lines: Vec<String>,
}

impl VerifySummary {
    pub fn from_outcomes(outcomes: &BTreeMap<RowId, Outcome>, not_found: &str) -> Self {
        let total = outcomes.len();
        let success = outcomes.values().filter(|o| o.is_found()).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            success as f64 / total as f64 * 100.0
        };
        Self {
            total,
            success,
            failed: total - success,
            success_rate,
            lines: outcomes
                .iter()
                .map(|(row, o)| format!("{row}: {}", o.cell_value(not_found)))
                .collect(),
        }
    }

    /// Text body of the `_dump.txt` summary file. Outcome lines are in sheet row
    /// order, not in the votes-descending order the rows were probed in.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total: {}", self.total);
        let _ = writeln!(out, "Success: {}", self.success);
        let _ = writeln!(out, "Failed: {}", self.failed);
        let _ = writeln!(out, "Success Rate: {:.2}%", self.success_rate);
        out.push_str(&self.lines.join("\n"));
        if !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}
