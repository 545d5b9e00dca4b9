//! Query API for listing tasks with filters.

use crate::storage;
use crate::store::Store;
use crate::types::{Status, Task, UserId};
use chrono::NaiveDate;
use eyre::Result;
use serde::{Deserialize, Serialize};

/// Filter criteria for task listings. All criteria are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,

    /// Due on or after this date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_from: Option<NaiveDate>,

    /// Due on or before this date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_to: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.assigned_to = Some(user);
        self
    }

    pub fn due_from(mut self, date: NaiveDate) -> Self {
        self.due_from = Some(date);
        self
    }

    pub fn due_to(mut self, date: NaiveDate) -> Self {
        self.due_to = Some(date);
        self
    }

    pub fn title_contains(mut self, substring: impl Into<String>) -> Self {
        self.title_contains = Some(substring.into());
        self
    }
}

/// Query builder for fluent task queries.
pub struct Query<'a> {
    store: &'a Store,
    filter: Filter,
}

impl<'a> Query<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            filter: Filter::new(),
        }
    }

    /// Filter by status.
    pub fn status(mut self, status: Status) -> Self {
        self.filter = self.filter.status(status);
        self
    }

    /// Filter by assignee.
    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.filter = self.filter.assigned_to(user);
        self
    }

    /// Filter by due date range (inclusive).
    pub fn due_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.filter = self.filter.due_from(from).due_to(to);
        self
    }

    /// Filter by title substring.
    pub fn title_contains(mut self, substring: impl Into<String>) -> Self {
        self.filter = self.filter.title_contains(substring);
        self
    }

    /// Execute the query and return matching tasks, newest first.
    pub fn execute(self) -> Result<Vec<Task>> {
        storage::query_tasks(self.store.storage().conn(), &self.filter)
    }

    /// Count matching tasks without fetching them.
    pub fn count(self) -> Result<usize> {
        storage::count_tasks(self.store.storage().conn(), &self.filter)
    }
}

/// Extension trait to add query methods to Store.
pub trait StoreQueryExt {
    /// Start building a query.
    fn query(&self) -> Query<'_>;

    /// Query with a pre-built filter.
    fn query_with_filter(&self, filter: &Filter) -> Result<Vec<Task>>;
}

impl StoreQueryExt for Store {
    fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    fn query_with_filter(&self, filter: &Filter) -> Result<Vec<Task>> {
        storage::query_tasks(self.storage().conn(), filter)
    }
}
