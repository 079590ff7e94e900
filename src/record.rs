use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Movie, MediaKind::Series];

    /// Path segment used by both TMDB and the embed service.
    pub fn api_path(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "tv",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Movie => "Movie",
            MediaKind::Series => "TV",
        }
    }

    pub fn title_field(self) -> &'static str {
        match self {
            MediaKind::Movie => "title",
            MediaKind::Series => "name",
        }
    }

    pub fn release_field(self) -> &'static str {
        match self {
            MediaKind::Movie => "release_date",
            MediaKind::Series => "first_air_date",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Some(MediaKind::Movie),
            "tv" | "series" => Some(MediaKind::Series),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_path())
    }
}

/// 1-based worksheet row number; row 1 is the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u32);

impl RowId {
    pub fn for_rank(rank: usize) -> Self {
        RowId(rank as u32 + 1)
    }

    /// Zero-based index as used by the xlsx writer; equals the rank for data rows.
    pub fn index(self) -> u32 {
        self.0.saturating_sub(1)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub kind: MediaKind,
    pub title: Option<String>,
    pub rating: Option<f64>,
    pub votes: Option<u64>,
    pub popularity: Option<f64>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
}

impl Record {
    /// Builds a record from one `results` item. Malformed fields become `None`.
    pub fn from_json(kind: MediaKind, item: &Value) -> Self {
        Self {
            id: item.get("id").and_then(Value::as_i64).unwrap_or(0),
            kind,
            title: non_empty_str(item, kind.title_field()),
            rating: item.get("vote_average").and_then(Value::as_f64),
            votes: item.get("vote_count").and_then(Value::as_u64),
            popularity: item.get("popularity").and_then(Value::as_f64),
            release_date: non_empty_str(item, kind.release_field()),
            poster_path: non_empty_str(item, "poster_path"),
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn release_date(&self) -> &str {
        self.release_date.as_deref().unwrap_or("")
    }
}

fn non_empty_str(item: &Value, field: &str) -> Option<String> {
    item.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub results: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    Popularity,
    Rating,
}

impl SortKey {
    pub fn as_param(self) -> &'static str {
        match self {
            SortKey::Popularity => "popularity.desc",
            SortKey::Rating => "vote_average.desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub sort: SortKey,
    pub genre: Option<u32>,
    pub min_votes: Option<u32>,
    pub text: Option<String>,
}

impl Query {
    pub fn discover(sort: SortKey, genre: Option<u32>) -> Self {
        Self {
            sort,
            genre,
            min_votes: None,
            text: None,
        }
    }

    pub fn endpoint(&self, kind: MediaKind) -> String {
        match self.text {
            Some(_) => format!("search/{}", kind.api_path()),
            None => format!("discover/{}", kind.api_path()),
        }
    }

    pub fn params(&self, api_key: &str, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("api_key", api_key.to_string()),
            ("sort_by", self.sort.as_param().to_string()),
            ("page", page.to_string()),
        ];
        if let Some(genre) = self.genre {
            params.push(("with_genres", genre.to_string()));
        }
        if let Some(min) = self.min_votes {
            params.push(("vote_count.gte", min.to_string()));
        }
        if let Some(text) = &self.text {
            params.push(("query", text.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn series_uses_name_and_first_air_date() {
        let item = json!({
            "id": 31910,
            "name": "Naruto Shippuden",
            "title": "ignored",
            "first_air_date": "2007-02-15",
            "vote_average": 8.5,
            "vote_count": 7000,
        });
        let r = Record::from_json(MediaKind::Series, &item);
        assert_eq!(r.display_title(), "Naruto Shippuden");
        assert_eq!(r.release_date(), "2007-02-15");
        assert_eq!(r.votes, Some(7000));
    }

    #[test]
    fn malformed_fields_become_none() {
        let item = json!({"id": "x", "title": 5, "vote_average": "high"});
        let r = Record::from_json(MediaKind::Movie, &item);
        assert_eq!(r.id, 0);
        assert_eq!(r.title, None);
        assert_eq!(r.rating, None);
    }

    #[test]
    fn search_query_switches_endpoint() {
        let mut q = Query::discover(SortKey::Popularity, Some(16));
        assert_eq!(q.endpoint(MediaKind::Series), "discover/tv");
        q.text = Some("akira".into());
        assert_eq!(q.endpoint(MediaKind::Movie), "search/movie");
        assert!(q.params("k", 2).contains(&("query", "akira".to_string())));
    }
}
