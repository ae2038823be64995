use crate::group::{GroupKey, KeySelector, group_by, pluralize};
use crate::record::{QueryMode, WordRecord};
use serde::{Deserialize, Serialize};

const SYLLABLE_FIELD: &str = "numSyllables";

/// A word on screen together with the handle its save control uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayItem {
    /// 1-based position across the whole output.
    pub index: usize,
    pub word: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub items: Vec<DisplayItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Output {
    #[default]
    Idle,
    Loading,
    Results { sections: Vec<Section> },
    NoResult,
    /// Terminal state for a lookup that could not complete.
    Failed { message: String },
}

impl Output {
    /// Resolves a save handle to the word it labels.
    pub fn item(&self, index: usize) -> Option<&str> {
        self.items()
            .find(|item| item.index == index)
            .map(|item| item.word.as_str())
    }

    pub fn items(&self) -> impl Iterator<Item = &DisplayItem> + '_ {
        self.sections()
            .iter()
            .flat_map(|section| section.items.iter())
    }

    pub fn sections(&self) -> &[Section] {
        match self {
            Output::Results { sections } => sections,
            _ => &[],
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Output::Failed {
            message: message.into(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Output::Loading)
    }
}

/// Everything displayed for one query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryView {
    pub mode: QueryMode,
    pub term: String,
    pub description: String,
    pub output: Output,
}

impl QueryView {
    pub fn loading(mode: QueryMode, term: &str) -> Self {
        Self {
            mode,
            term: term.to_string(),
            description: mode.description(term),
            output: Output::Loading,
        }
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }
}

/// Builds the output for a completed lookup.
pub fn render(mode: QueryMode, records: &[WordRecord]) -> Output {
    if records.is_empty() {
        return Output::NoResult;
    }
    let sections = match mode {
        QueryMode::Rhyme => render_rhymes(records),
        QueryMode::Synonym => render_plain(records),
    };
    Output::Results { sections }
}

/// One section per syllable count, ascending.
pub fn render_rhymes(records: &[WordRecord]) -> Vec<Section> {
    let grouped = group_by(records.iter(), KeySelector::field(SYLLABLE_FIELD));
    let mut next_index = 1;
    grouped
        .into_iter()
        .map(|(key, bucket)| Section {
            heading: Some(syllable_heading(&key)),
            items: number_items(bucket.into_iter(), &mut next_index),
        })
        .collect()
}

/// A single untitled section in the order received.
pub fn render_plain(records: &[WordRecord]) -> Vec<Section> {
    let mut next_index = 1;
    vec![Section {
        heading: None,
        items: number_items(records.iter(), &mut next_index),
    }]
}

pub fn syllable_heading(key: &GroupKey) -> String {
    match key.as_count() {
        Some(count) => format!("{count} syllable{}:", pluralize(count)),
        None => "Unknown syllables:".to_string(),
    }
}

fn number_items<'a>(
    records: impl Iterator<Item = &'a WordRecord>,
    next_index: &mut usize,
) -> Vec<DisplayItem> {
    records
        .map(|record| {
            let item = DisplayItem {
                index: *next_index,
                word: record.word.clone(),
            };
            *next_index += 1;
            item
        })
        .collect()
}
