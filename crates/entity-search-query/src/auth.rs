//! Authorization context threaded through query compilation (spec §4.6
//! "auth context", §4.7 "Authorization injection"), grounded on
//! `original_source/query/util.py::datasets_query`.

/// The caller's dataset-level access, bound into every compiled query
/// unless `is_admin` is set.
#[derive(Debug, Clone, Default)]
pub struct SearchAuth {
    pub datasets: Vec<String>,
    pub logged_in: bool,
    pub is_admin: bool,
}

impl SearchAuth {
    #[must_use]
    pub fn admin() -> Self {
        Self { datasets: Vec::new(), logged_in: true, is_admin: true }
    }

    #[must_use]
    pub fn for_datasets(datasets: Vec<String>) -> Self {
        Self { datasets, logged_in: true, is_admin: false }
    }
}
