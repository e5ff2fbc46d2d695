use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::domain::{Submission, SubmissionStatus, SubmissionSummary};
use super::validation::ValidationErrors;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_SEARCH_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    SubmittedAt,
    FullName,
    Status,
}

impl SortField {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "submittedAt" => Some(Self::SubmittedAt),
            "fullName" => Some(Self::FullName),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Raw query string as received from the admin list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionQueryParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Validated filter, ordering, and paging for a submission listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionQuery {
    pub status: Option<SubmissionStatus>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for SubmissionQuery {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
}

impl SubmissionQuery {
    pub fn from_params(params: &SubmissionQueryParams) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let mut query = Self::default();

        if let Some(raw) = non_blank(&params.status) {
            match raw.parse::<SubmissionStatus>() {
                Ok(status) => query.status = Some(status),
                Err(_) => errors.push("status", "Status must be pending, approved, or rejected"),
            }
        }

        if let Some(raw) = non_blank(&params.search) {
            if raw.chars().count() > MAX_SEARCH_LENGTH {
                errors.push(
                    "search",
                    format!("Search term cannot exceed {MAX_SEARCH_LENGTH} characters"),
                );
            } else {
                query.search = Some(raw.to_string());
            }
        }

        if let Some(raw) = non_blank(&params.sort_by) {
            match SortField::parse(raw) {
                Some(field) => query.sort_by = field,
                None => errors.push("sortBy", "sortBy must be submittedAt, fullName, or status"),
            }
        }

        if let Some(raw) = non_blank(&params.sort_order) {
            match SortOrder::parse(raw) {
                Some(order) => query.sort_order = order,
                None => errors.push("sortOrder", "sortOrder must be asc or desc"),
            }
        }

        if let Some(raw) = non_blank(&params.page) {
            match raw.parse::<u32>() {
                Ok(page) if page >= 1 => query.page = page,
                _ => errors.push("page", "Page must be a positive integer"),
            }
        }

        if let Some(raw) = non_blank(&params.limit) {
            match raw.parse::<u32>() {
                Ok(limit) if (1..=MAX_PAGE_SIZE).contains(&limit) => query.limit = limit,
                _ => errors.push(
                    "limit",
                    format!("Limit must be between 1 and {MAX_PAGE_SIZE}"),
                ),
            }
        }

        errors.into_result().map(|()| query)
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }

    pub fn matches(&self, submission: &Submission) -> bool {
        if let Some(status) = self.status {
            if submission.status() != status {
                return false;
            }
        }
        match &self.search {
            Some(needle) => submission.matches_search(needle),
            None => true,
        }
    }

    /// Ordering for the requested sort; ties fall back to submission time then public id.
    pub fn compare(&self, left: &Submission, right: &Submission) -> Ordering {
        let primary = match self.sort_by {
            SortField::SubmittedAt => left.submitted_at.cmp(&right.submitted_at),
            SortField::FullName => left
                .personal
                .full_name
                .to_lowercase()
                .cmp(&right.personal.full_name.to_lowercase()),
            SortField::Status => left.status().label().cmp(right.status().label()),
        };
        let ordered = primary
            .then_with(|| left.submitted_at.cmp(&right.submitted_at))
            .then_with(|| left.submission_id.cmp(&right.submission_id));
        match self.sort_order {
            SortOrder::Asc => ordered,
            SortOrder::Desc => ordered.reverse(),
        }
    }

    /// Filter, sort, and slice an in-memory collection, returning the page and the filtered total.
    pub fn apply<I>(&self, records: I) -> (Vec<Submission>, u64)
    where
        I: IntoIterator<Item = Submission>,
    {
        let mut matching: Vec<Submission> = records
            .into_iter()
            .filter(|submission| self.matches(submission))
            .collect();
        matching.sort_by(|left, right| self.compare(left, right));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect();
        (page, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub items_per_page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total_items: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total_items.div_ceil(u64::from(limit));
        let total_pages = u32::try_from(total_pages).unwrap_or(u32::MAX);
        Self {
            current_page: page,
            total_pages,
            total_items,
            items_per_page: limit,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPage {
    pub submissions: Vec<SubmissionSummary>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> SubmissionQueryParams {
        let mut params = SubmissionQueryParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "status" => params.status = value,
                "search" => params.search = value,
                "sortBy" => params.sort_by = value,
                "sortOrder" => params.sort_order = value,
                "page" => params.page = value,
                "limit" => params.limit = value,
                other => panic!("unexpected key {other}"),
            }
        }
        params
    }

    #[test]
    fn defaults_apply_when_params_missing() {
        let query = SubmissionQuery::from_params(&params(&[])).expect("defaults");
        assert_eq!(query, SubmissionQuery::default());
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.sort_by, SortField::SubmittedAt);
        assert_eq!(query.sort_order, SortOrder::Desc);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let errors = SubmissionQuery::from_params(&params(&[
            ("page", "0"),
            ("limit", "101"),
            ("status", "archived"),
            ("sortBy", "email"),
        ]))
        .expect_err("invalid params");
        for field in ["page", "limit", "status", "sortBy"] {
            assert!(errors.mentions(field), "missing error for {field}");
        }
    }

    #[test]
    fn search_is_trimmed_and_bounded() {
        let query = SubmissionQuery::from_params(&params(&[("search", "  jane  ")])).expect("ok");
        assert_eq!(query.search.as_deref(), Some("jane"));

        let long = "a".repeat(MAX_SEARCH_LENGTH + 1);
        let errors =
            SubmissionQuery::from_params(&params(&[("search", &long)])).expect_err("too long");
        assert!(errors.mentions("search"));
    }

    #[test]
    fn pagination_rounds_up_and_flags_neighbours() {
        let first = Pagination::new(1, 10, 25);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next_page);
        assert!(!first.has_prev_page);

        let last = Pagination::new(3, 10, 25);
        assert!(!last.has_next_page);
        assert!(last.has_prev_page);

        let empty = Pagination::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next_page);
    }
}
