use crate::{
    artifact::{self, ReportRow},
    classify::{self, FilterToken},
    config::Config,
    fetch::{FetchError, Fetcher},
    paginate::{PageSource, Paginator},
    rank::{rank, Metric},
    record::{MediaKind, Query, Record, SortKey},
    report::{FileReport, HarvestReport, TotalsReport},
    util::{ensure_dir, now_rfc3339},
};
use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

const TOP_RUNS: [(MediaKind, Metric); 4] = [
    (MediaKind::Movie, Metric::Rating),
    (MediaKind::Series, Metric::Rating),
    (MediaKind::Movie, Metric::Popularity),
    (MediaKind::Series, Metric::Popularity),
];

pub struct Harvest<S: PageSource> {
    cfg: Config,
    paginator: Paginator<S>,
    posters: Option<Fetcher>,
}

impl<S: PageSource> Harvest<S> {
    /// `posters` is used for cover downloads; `None` writes every row as "No Poster".
    pub fn new(cfg: &Config, paginator: Paginator<S>, posters: Option<Fetcher>) -> Self {
        Self {
            cfg: cfg.clone(),
            paginator,
            posters,
        }
    }

    /// Harvests every movie and series of the configured genre and writes one
    /// workbook per initial (`A.xlsx` .. `Z.xlsx`, `other.xlsx`), or only the
    /// workbook for `only` when given.
    pub async fn run_catalog(
        &mut self,
        out_dir: &Path,
        only: Option<FilterToken>,
        text: Option<String>,
    ) -> Result<HarvestReport> {
        let started = now_rfc3339();
        let query = Query {
            sort: SortKey::Popularity,
            genre: Some(self.cfg.api.genre_id),
            min_votes: None,
            text,
        };

        info!("data collection started (Ctrl+C to abort)");
        let mut records = Vec::new();
        let mut aborted = None;
        for kind in MediaKind::ALL {
            if let Err(e) = self.paginator.collect(kind, &query, None, &mut records).await {
                aborted = Some(e);
                break;
            }
        }
        info!(records = records.len(), "collection complete");

        let groups: Vec<(String, Vec<Record>)> = match only {
            Some(token) => vec![(token.file_stem(), classify::filter(&records, token))],
            None => classify::classify(&records).into_iter().collect(),
        };

        ensure_dir(out_dir)?;
        let embed = aborted.is_none() && self.cfg.harvest.embed_posters;
        let mut report = HarvestReport {
            mode: "catalog".into(),
            started,
            ..Default::default()
        };
        for (key, group) in groups {
            if group.is_empty() {
                continue;
            }
            let path = out_dir.join(format!("{key}.xlsx"));
            report.records += group.len();
            report.files.push(self.write(&path, "Data", group, embed).await?);
        }
        report.finished = now_rfc3339();
        if aborted.is_none() && self.cancelled() {
            aborted = Some(FetchError::Cancelled);
        }

        match aborted {
            Some(e) => Err(abort_error(e, report.records, out_dir)),
            None => Ok(report),
        }
    }

    /// Collects the top `count` movies and series by rating and by popularity,
    /// one workbook each under `out_dir`.
    pub async fn run_top(
        &mut self,
        out_dir: &Path,
        count: usize,
        genre: Option<u32>,
    ) -> Result<HarvestReport> {
        let mut report = HarvestReport {
            mode: "top".into(),
            started: now_rfc3339(),
            ..Default::default()
        };
        ensure_dir(out_dir)?;

        for (kind, metric) in TOP_RUNS {
            let query = Query {
                sort: metric.sort_key(),
                genre,
                min_votes: (metric == Metric::Rating).then_some(self.cfg.harvest.top_min_votes),
                text: None,
            };
            let mut records = Vec::new();
            let res = self
                .paginator
                .collect(kind, &query, Some(count), &mut records)
                .await;

            info!(%kind, metric = metric.as_str(), "sorting {} results", records.len());
            let ranked = rank(records, metric, count);
            let path = out_dir.join(top_file_name(kind, metric));
            let sheet = format!("Top {}", ranked.len());
            report.records += ranked.len();
            let embed = res.is_ok() && self.cfg.harvest.embed_posters;
            report.files.push(self.write(&path, &sheet, ranked, embed).await?);

            if let Err(e) = res {
                return Err(abort_error(e, report.records, out_dir));
            }
            if self.cancelled() {
                return Err(abort_error(FetchError::Cancelled, report.records, out_dir));
            }
        }

        report.finished = now_rfc3339();
        Ok(report)
    }

    /// Total result counts of the configured genre, from page 1 of each kind.
    pub async fn run_totals(&mut self) -> Result<TotalsReport> {
        let query = Query::discover(SortKey::Popularity, Some(self.cfg.api.genre_id));
        let mut counts = [0u64; 2];
        for (slot, kind) in counts.iter_mut().zip(MediaKind::ALL) {
            let page = self
                .paginator
                .source_mut()
                .fetch_page(kind, &query, 1)
                .await?;
            *slot = page.total_results.unwrap_or(0);
        }
        Ok(TotalsReport {
            movies: counts[0],
            tv: counts[1],
            total: counts[0] + counts[1],
        })
    }

    fn cancelled(&self) -> bool {
        self.paginator.cancel_token().is_cancelled()
    }

    async fn write(
        &self,
        path: &Path,
        sheet: &str,
        records: Vec<Record>,
        embed: bool,
    ) -> Result<FileReport> {
        let mut rows = ReportRow::ranked(records);
        if embed {
            if let Some(fetcher) = &self.posters {
                let base = self.cfg.api.image_base_url.trim_end_matches('/');
                let timeout = Duration::from_secs(self.cfg.harvest.poster_timeout_seconds);
                for row in &mut rows {
                    if self.cancelled() {
                        break;
                    }
                    if let Some(poster) = &row.record.poster_path {
                        let url = format!("{base}/{}", poster.trim_start_matches('/'));
                        row.poster = fetcher.fetch_bytes(&url, timeout).await;
                    }
                }
            }
        }
        let posters = artifact::write_records(path, sheet, &rows)?;
        Ok(FileReport {
            path: path.display().to_string(),
            rows: rows.len(),
            posters,
        })
    }
}

pub fn top_file_name(kind: MediaKind, metric: Metric) -> String {
    let prefix = match kind {
        MediaKind::Movie => "movies",
        MediaKind::Series => "tv",
    };
    format!("{prefix}_by_{}.xlsx", metric.as_str())
}

fn abort_error(e: FetchError, saved: usize, out_dir: &Path) -> anyhow::Error {
    error!("[aborted] {e}; {saved} records saved under {}", out_dir.display());
    anyhow::Error::new(e).context(format!(
        "harvest aborted; {saved} records saved under {}",
        out_dir.display()
    ))
}
