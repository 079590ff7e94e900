use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub harvest: Harvest,
    #[serde(default)]
    pub verify: Verify,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub image_base_url: String,
    pub api_key: String,
    pub api_key_env: String,
    pub genre_id: u32,
}
impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".into(),
            image_base_url: "https://image.tmdb.org/t/p/w200".into(),
            api_key: "".into(),
            api_key_env: "TMDB_API_KEY".into(),
            genre_id: 16,
        }
    }
}

impl Api {
    /// The environment variable named by `api_key_env` wins over the inline key.
    pub fn resolve_key(&self) -> String {
        if !self.api_key_env.is_empty() {
            if let Ok(v) = std::env::var(&self.api_key_env) {
                if !v.trim().is_empty() {
                    return v.trim().to_string();
                }
            }
        }
        self.api_key.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fetch {
    pub timeout_seconds: u64,
    pub retry_delay_ms: u64,
    pub alert_interval_ms: u64,
    pub page_delay_ms: u64,
    pub max_attempts: u32,
    /// Last page the API serves; pagination stops here even if `total_pages` is larger.
    #[serde(default = "default_max_page")]
    pub max_page: u32,
    pub error_excerpt_chars: usize,
    pub status_line: bool,
}

fn default_max_page() -> u32 {
    500
}
impl Default for Fetch {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            retry_delay_ms: 3000,
            alert_interval_ms: 3000,
            page_delay_ms: 1000,
            max_attempts: 5,
            max_page: default_max_page(),
            error_excerpt_chars: 100,
            status_line: true,
        }
    }
}

impl Fetch {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_millis(self.alert_interval_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Harvest {
    pub out_dir: String,
    pub top_dir: String,
    pub top_count: usize,
    pub top_min_votes: u32,
    pub embed_posters: bool,
    pub poster_timeout_seconds: u64,
}
impl Default for Harvest {
    fn default() -> Self {
        Self {
            out_dir: ".".into(),
            top_dir: "tmdb-top".into(),
            top_count: 100,
            top_min_votes: 1000,
            embed_posters: true,
            poster_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verify {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub success_delay_ms: u64,
    pub failure_delay_ms: u64,
    pub marker: String,
    pub series_suffix: String,
    pub column_header: String,
    pub not_found: String,
}
impl Default for Verify {
    fn default() -> Self {
        Self {
            base_url: "https://vidsrc.me".into(),
            timeout_seconds: 10,
            success_delay_ms: 3000,
            failure_delay_ms: 1000,
            marker: "embed".into(),
            series_suffix: "1/1".into(),
            column_header: "MediaUrl".into(),
            not_found: "Not Found".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
