/// Secondary-index lookup over stored aggregates.
///
/// Matches every record of `aggregate_type` whose index terms contain
/// `index_term`. Results are ordered by aggregate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub aggregate_type: String,
    pub index_term: String,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new(aggregate_type: impl Into<String>, index_term: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            index_term: index_term.into(),
            limit: None,
        }
    }

    /// Caps the number of returned records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
