use crate::record::Record;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

pub const OTHER: &str = "other";

/// Bucket for a title: its uppercased first ASCII letter, or `other`.
pub fn bucket_key(title: &str) -> String {
    match title.trim().chars().next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase().to_string(),
        _ => OTHER.to_string(),
    }
}

/// Every record lands in exactly one bucket, in input order.
pub fn classify(records: &[Record]) -> BTreeMap<String, Vec<Record>> {
    let mut buckets: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for r in records {
        buckets
            .entry(bucket_key(r.display_title()))
            .or_default()
            .push(r.clone());
    }
    buckets
}

/// All 27 keys in output order, A..Z then `other`.
pub fn all_keys() -> Vec<String> {
    ('A'..='Z')
        .map(|c| c.to_string())
        .chain(std::iter::once(OTHER.to_string()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterToken {
    /// Single alphanumeric character, stored uppercased.
    Char(char),
    /// `!`: titles that are empty or start with a non-alphanumeric character.
    NonAlphanumeric,
}

impl FilterToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "!" {
            return Ok(FilterToken::NonAlphanumeric);
        }
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_alphanumeric() => Ok(FilterToken::Char(upper(c))),
            _ => Err(anyhow!(
                "invalid filter token {raw:?}: expected one letter/digit or \"!\""
            )),
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        let first = title.trim().chars().next();
        match (self, first) {
            (FilterToken::Char(t), Some(c)) => upper(c) == *t,
            (FilterToken::Char(_), None) => false,
            (FilterToken::NonAlphanumeric, Some(c)) => !c.is_alphanumeric(),
            (FilterToken::NonAlphanumeric, None) => true,
        }
    }

    /// Output file stem for the filtered run.
    pub fn file_stem(&self) -> String {
        match self {
            FilterToken::Char(c) => c.to_string(),
            FilterToken::NonAlphanumeric => OTHER.to_string(),
        }
    }
}

pub fn filter(records: &[Record], token: FilterToken) -> Vec<Record> {
    records
        .iter()
        .filter(|r| token.matches(r.display_title()))
        .cloned()
        .collect()
}

fn upper(c: char) -> char {
    // Single-char uppercase only; multi-char expansions (ß) compare as-is.
    let mut up = c.to_uppercase();
    match (up.next(), up.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}
