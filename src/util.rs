use anyhow::{Context, Result};
use std::io::{IsTerminal, Write};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn clock_hms(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".to_string())
}

/// Single-line excerpt of an error message, at most `max` chars.
pub fn excerpt(msg: &str, max: usize) -> String {
    let flat = msg.replace(['\r', '\n'], " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut out: String = flat.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Carriage-return progress line on stderr; inert when stderr is not a terminal.
pub struct StatusLine {
    enabled: bool,
    width: usize,
}

impl StatusLine {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: enabled && std::io::stderr().is_terminal(),
            width: 0,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            width: 0,
        }
    }

    pub fn update(&mut self, msg: &str) {
        if !self.enabled {
            return;
        }
        let len = msg.chars().count();
        let pad = self.width.saturating_sub(len);
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{msg}{}", " ".repeat(pad));
        let _ = err.flush();
        self.width = len;
    }

    pub fn finish(&mut self) {
        if self.enabled && self.width > 0 {
            let _ = writeln!(std::io::stderr());
        }
        self.width = 0;
    }
}
