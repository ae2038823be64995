use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One item returned by the word-relations service.
///
/// Only `word` is guaranteed. Rhyme lookups also carry `numSyllables`;
/// anything the service adds beyond the known fields is kept in `extra`
/// so field-based grouping can still see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(
        rename = "numSyllables",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub num_syllables: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WordRecord {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            score: None,
            num_syllables: None,
            tags: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_syllables(mut self, count: u32) -> Self {
        self.num_syllables = Some(count);
        self
    }

    pub fn with_score(mut self, score: u64) -> Self {
        self.score = Some(score);
        self
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Rhyme,
    Synonym,
}

impl QueryMode {
    /// Query-string parameter understood by the remote service.
    pub fn param(&self) -> &'static str {
        match self {
            QueryMode::Rhyme => "rel_rhy",
            QueryMode::Synonym => "ml",
        }
    }

    pub fn description(&self, term: &str) -> String {
        match self {
            QueryMode::Rhyme => format!("Words that rhyme with {term}"),
            QueryMode::Synonym => format!("Words with a similar meaning to {term}"),
        }
    }

    pub fn query_value(&self) -> &'static str {
        match self {
            QueryMode::Rhyme => "rhyme",
            QueryMode::Synonym => "synonym",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown query mode {:?} (expected rhyme or synonym)", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for QueryMode {
    type Err = UnknownMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rhyme" | "rhymes" | "rel_rhy" => Ok(QueryMode::Rhyme),
            "synonym" | "synonyms" | "syn" | "ml" => Ok(QueryMode::Synonym),
            _ => Err(UnknownMode(value.to_string())),
        }
    }
}
