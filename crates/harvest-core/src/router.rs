//! Picks the collection a record is written to.

use crate::reduce::is_success_code;

/// Success / error collection router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRouter {
    success_codes: Vec<i32>,
    success_collection: String,
    error_collection: Option<String>,
}

impl CollectionRouter {
    pub fn new(success_collection: impl Into<String>, success_codes: Vec<i32>) -> Self {
        Self {
            success_codes,
            success_collection: success_collection.into(),
            error_collection: None,
        }
    }

    /// Route non-success statuses to `collection`.
    pub fn with_error_collection(mut self, collection: impl Into<String>) -> Self {
        self.error_collection = Some(collection.into());
        self
    }

    pub fn success_codes(&self) -> &[i32] {
        &self.success_codes
    }

    pub fn success_collection(&self) -> &str {
        &self.success_collection
    }

    /// Error collection, falling back to the success collection.
    pub fn error_collection(&self) -> &str {
        self.error_collection
            .as_deref()
            .unwrap_or(&self.success_collection)
    }

    /// Collection for a terminal status. A missing status counts as an error.
    pub fn route(&self, status: Option<i32>) -> &str {
        match status {
            Some(code) if is_success_code(code, &self.success_codes) => &self.success_collection,
            _ => self.error_collection(),
        }
    }
}
