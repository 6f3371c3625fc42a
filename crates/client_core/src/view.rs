use std::{cmp::Ordering, fmt, str::FromStr, sync::Arc};

use crate::record::{FieldValue, Fields, Pipelined, Searchable};

/// Status column filter for pipelined views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter<S> {
    All,
    /// Everything except the terminal statuses.
    Active,
    Only(S),
}

impl<S> Default for StatusFilter<S> {
    fn default() -> Self {
        StatusFilter::All
    }
}

impl<S: Copy + Eq> StatusFilter<S> {
    pub fn matches<T: Pipelined<Status = S>>(&self, item: &T) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !T::is_terminal(item.status()),
            StatusFilter::Only(status) => item.status() == *status,
        }
    }
}

impl<S: FromStr> FromStr for StatusFilter<S> {
    type Err = S::Err;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            other => other.parse().map(StatusFilter::Only),
        }
    }
}

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// AND of independent predicates over a collection.
pub struct ViewFilter<T> {
    search_term: String,
    predicates: Vec<Predicate<T>>,
}

impl<T> Clone for ViewFilter<T> {
    fn clone(&self) -> Self {
        Self {
            search_term: self.search_term.clone(),
            predicates: self.predicates.clone(),
        }
    }
}

impl<T> fmt::Debug for ViewFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewFilter")
            .field("search_term", &self.search_term)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

impl<T> Default for ViewFilter<T> {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            predicates: Vec::new(),
        }
    }
}

impl<T: Searchable> ViewFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring match over the record's search fields.
    /// Blank terms match everything.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into().trim().to_lowercase();
        self
    }

    pub fn matching(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    pub fn matches(&self, item: &T) -> bool {
        let search_hit = self.search_term.is_empty()
            || item
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&self.search_term));
        search_hit && self.predicates.iter().all(|predicate| predicate(item))
    }

    pub fn apply(&self, items: &[T]) -> Vec<T>
    where
        T: Clone,
    {
        items.iter().filter(|item| self.matches(item)).cloned().collect()
    }
}

impl<T: Searchable + Pipelined> ViewFilter<T> {
    pub fn status(self, filter: StatusFilter<T::Status>) -> Self {
        self.matching(move |item| filter.matches(item))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    Table(SortSpec),
    Board,
}

fn compare_values(a: &FieldValue<'_>, b: &FieldValue<'_>) -> Ordering {
    match (a, b) {
        (FieldValue::Text(a), FieldValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
        (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
        (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Column sort for tabular views. Nulls (and unknown fields) sort last in
/// both directions; the sort is stable.
pub fn sort_by_field<T: Fields + Clone>(items: &[T], spec: &SortSpec) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        let a = a.field(&spec.field).unwrap_or(FieldValue::Missing);
        let b = b.field(&spec.field).unwrap_or(FieldValue::Missing);
        match (a.is_missing(), b.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match spec.direction {
                SortDirection::Ascending => compare_values(&a, &b),
                SortDirection::Descending => compare_values(&b, &a),
            },
        }
    });
    sorted
}

/// Board order: status priority bucket, then the dated status by date
/// (undated last), then manual position.
pub fn sort_for_board<T: Pipelined>(items: &[T]) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        T::board_rank(a.status())
            .cmp(&T::board_rank(b.status()))
            .then_with(|| match (a.board_date(), b.board_date()) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.position().cmp(&b.position()))
    });
    sorted
}

/// Filter then sort.
pub fn visible<T>(items: &[T], filter: &ViewFilter<T>, mode: &ViewMode) -> Vec<T>
where
    T: Pipelined + Searchable + Fields,
{
    let filtered = filter.apply(items);
    match mode {
        ViewMode::Table(spec) => sort_by_field(&filtered, spec),
        ViewMode::Board => sort_for_board(&filtered),
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
