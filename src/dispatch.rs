use crate::datamuse::WordSource;
use crate::record::QueryMode;
use crate::render::{Output, QueryView, render};
use crate::session::Session;
use std::sync::Arc;
use tracing::warn;

/// Runs lookups against a [`WordSource`] and turns the answer into a [`QueryView`].
#[derive(Clone)]
pub struct Dispatcher {
    source: Arc<dyn WordSource>,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn WordSource>) -> Self {
        Self { source }
    }

    /// Fetches and renders one query.
    ///
    /// Rhymes are grouped by syllable count; synonyms are listed as received.
    /// A failed lookup ends in [`Output::Failed`] rather than an error.
    pub async fn dispatch(&self, mode: QueryMode, term: &str) -> QueryView {
        let view = QueryView::loading(mode, term);
        let output = match self.source.lookup(mode, term).await {
            Ok(records) => render(mode, &records),
            Err(err) => {
                warn!(error = %err, %mode, term, "word lookup failed");
                Output::failed(err.to_string())
            }
        };
        view.with_output(output)
    }

    /// Dispatches on behalf of `session`, applying the result only if no
    /// newer query was started in the meantime.
    pub async fn run(&self, session: &mut Session, mode: QueryMode, term: &str) -> bool {
        let seq = session.begin(mode, term);
        let view = self.dispatch(mode, term).await;
        session.apply(seq, view)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::datamuse::{LookupError, WordSource};
    use crate::record::{QueryMode, WordRecord};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::collections::HashMap;

    /// Canned answers keyed by mode and term; unknown terms answer with no records.
    #[derive(Default)]
    pub struct FixtureSource {
        answers: HashMap<(QueryMode, String), Vec<WordRecord>>,
        failing: Vec<String>,
        pub calls: Mutex<Vec<(QueryMode, String)>>,
    }

    impl FixtureSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(mut self, mode: QueryMode, term: &str, records: Vec<WordRecord>) -> Self {
            self.answers.insert((mode, term.to_string()), records);
            self
        }

        pub fn failing(mut self, term: &str) -> Self {
            self.failing.push(term.to_string());
            self
        }

        pub fn with_cat_rhymes(self) -> Self {
            self.answer(
                QueryMode::Rhyme,
                "cat",
                vec![
                    WordRecord::new("hat").with_syllables(1),
                    WordRecord::new("acrobat").with_syllables(3),
                    WordRecord::new("format").with_syllables(2),
                    WordRecord::new("bat").with_syllables(1),
                ],
            )
        }
    }

    #[async_trait]
    impl WordSource for FixtureSource {
        async fn lookup(
            &self,
            mode: QueryMode,
            term: &str,
        ) -> Result<Vec<WordRecord>, LookupError> {
            self.calls.lock().push((mode, term.to_string()));
            if self.failing.iter().any(|t| t == term) {
                return Err(LookupError::Status(StatusCode::BAD_GATEWAY));
            }
            Ok(self
                .answers
                .get(&(mode, term.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }
}
