use crate::models::ResultsContainer;

/// Which task entries `fetch_query_details_batch` reports per document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TaskSelection {
    /// The whole results container.
    All,
    /// Only the listed task names that are present.
    Named(Vec<String>),
    /// No entries; only the matching document ids.
    #[default]
    None,
}

impl TaskSelection {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    /// Maps the `(all_tasks, tasknames)` argument pair job runners send.
    /// `all_tasks` wins over an explicit name list.
    pub fn from_flags(all_tasks: bool, tasknames: Option<Vec<String>>) -> Self {
        match (all_tasks, tasknames) {
            (true, _) => Self::All,
            (false, Some(names)) => Self::Named(names),
            (false, None) => Self::None,
        }
    }

    pub fn project(&self, mut results: ResultsContainer) -> ResultsContainer {
        match self {
            Self::All => results,
            Self::Named(names) => {
                results.retain(|task, _| names.iter().any(|name| name == task));
                results
            }
            Self::None => ResultsContainer::new(),
        }
    }
}
