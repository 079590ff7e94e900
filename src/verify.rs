use crate::{
    artifact::{self, Sheet, COL_ID, COL_VOTES},
    config::{Config, Verify as VerifyCfg},
    fetch::FetchError,
    record::{MediaKind, RowId},
    report::VerifySummary,
};
use anyhow::{Context, Result};
use reqwest::{redirect, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyTarget {
    pub row_id: RowId,
    pub id: i64,
    pub votes: i64,
}

pub fn extract_targets(sheet: &Sheet) -> Vec<VerifyTarget> {
    sheet
        .rows
        .iter()
        .map(|row| VerifyTarget {
            row_id: row.row_id,
            id: row.cell(COL_ID).as_i64_lenient(),
            votes: row.cell(COL_VOTES).as_i64_lenient(),
        })
        .collect()
}

/// Highest vote counts first (stable), optionally capped.
pub fn plan_targets(mut targets: Vec<VerifyTarget>, limit: Option<usize>) -> Vec<VerifyTarget> {
    targets.sort_by(|a, b| b.votes.cmp(&a.votes));
    if let Some(n) = limit {
        targets.truncate(n);
    }
    targets
}

/// `tv_*` files hold series; everything else is treated as movies.
pub fn infer_kind(path: &Path) -> MediaKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.starts_with("tv_") || name.contains("_tv_") {
        MediaKind::Series
    } else {
        MediaKind::Movie
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Found(String),
    NotFound,
}

impl Outcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    pub fn cell_value(&self, not_found: &str) -> String {
        match self {
            Outcome::Found(url) => url.clone(),
            Outcome::NotFound => not_found.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyRun {
    pub outcomes: BTreeMap<RowId, Outcome>,
    pub interrupted: bool,
}

pub struct Verifier {
    client: Client,
    cfg: VerifyCfg,
    cancel: CancellationToken,
}

impl Verifier {
    pub fn new(cfg: &VerifyCfg, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .redirect(redirect::Policy::limited(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            cfg: cfg.clone(),
            cancel,
        })
    }

    pub fn probe_url(&self, kind: MediaKind, id: i64) -> String {
        let base = self.cfg.base_url.trim_end_matches('/');
        let mut url = format!("{base}/embed/{}/{id}/", kind.api_path());
        if kind == MediaKind::Series {
            url.push_str(self.cfg.series_suffix.trim_matches('/'));
        }
        url
    }

    /// One request; `None` only when cancelled.
    pub async fn probe(&self, kind: MediaKind, id: i64) -> Option<Outcome> {
        let url = self.probe_url(kind, id);
        debug!(%kind, id, %url, "probing");
        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = self.client.get(&url).send() => r,
        };
        let outcome = match res {
            Ok(resp) => {
                let status = resp.status();
                let final_url = resp.url().to_string();
                // A redirect to a generic page still answers 200.
                if status == StatusCode::OK && final_url.contains(&self.cfg.marker) {
                    info!(id, "valid: {final_url}");
                    Outcome::Found(final_url)
                } else {
                    info!(id, status = status.as_u16(), "invalid");
                    Outcome::NotFound
                }
            }
            Err(e) => {
                warn!(id, "probe error: {e}");
                Outcome::NotFound
            }
        };
        Some(outcome)
    }

    /// Probes targets one at a time in the given order, pacing between requests.
    pub async fn verify(&self, kind: MediaKind, targets: &[VerifyTarget]) -> VerifyRun {
        let mut run = VerifyRun::default();
        let total = targets.len();
        info!(total, %kind, "verifying records");

        for (i, t) in targets.iter().enumerate() {
            let Some(outcome) = self.probe(kind, t.id).await else {
                run.interrupted = true;
                break;
            };
            let found = outcome.is_found();
            match run.outcomes.entry(t.row_id) {
                Entry::Vacant(slot) => {
                    slot.insert(outcome);
                }
                Entry::Occupied(_) => {
                    warn!(row = %t.row_id, "duplicate row id; keeping first outcome");
                }
            }
            debug!(done = i + 1, total, "progress");

            if i + 1 < total {
                let delay = if found {
                    Duration::from_millis(self.cfg.success_delay_ms)
                } else {
                    Duration::from_millis(self.cfg.failure_delay_ms)
                };
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        run.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        run
    }
}

pub fn dump_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "verify".to_string());
    path.with_file_name(format!("{stem}_dump.txt"))
}

/// Verifies the rows of an existing artifact and writes the outcomes back into it.
/// On interrupt the outcomes gathered so far are saved before the error is returned.
pub async fn run_verify(
    cfg: &Config,
    path: &Path,
    limit: Option<usize>,
    kind: Option<MediaKind>,
    cancel: CancellationToken,
) -> Result<VerifySummary> {
    let kind = kind.unwrap_or_else(|| infer_kind(path));
    let mut sheet = artifact::read_sheet(path)?;
    let targets = plan_targets(extract_targets(&sheet), limit);

    let verifier = Verifier::new(&cfg.verify, cancel)?;
    let run = verifier.verify(kind, &targets).await;

    let values: BTreeMap<RowId, String> = run
        .outcomes
        .iter()
        .map(|(row, o)| (*row, o.cell_value(&cfg.verify.not_found)))
        .collect();
    artifact::apply_column(&mut sheet, &cfg.verify.column_header, &values);
    artifact::write_sheet(path, &sheet)?;

    let summary = VerifySummary::from_outcomes(&run.outcomes, &cfg.verify.not_found);
    let dump = dump_path(path);
    std::fs::write(&dump, summary.render())
        .with_context(|| format!("writing {}", dump.display()))?;
    info!(
        total = summary.total,
        success = summary.success,
        failed = summary.failed,
        "success rate {:.2}% (summary: {})",
        summary.success_rate,
        dump.display()
    );

    if run.interrupted {
        return Err(anyhow::Error::new(FetchError::Cancelled).context(format!(
            "verification interrupted; {} of {} outcomes saved to {}",
            run.outcomes.len(),
            targets.len(),
            path.display()
        )));
    }
    Ok(summary)
}
