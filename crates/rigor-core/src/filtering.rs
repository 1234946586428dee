//! Selecting tests by name.
//!
//! A selection names a class, optionally qualified by module, optionally
//! narrowed to one method:
//!
//! | Selection            | Selects                                |
//! |----------------------|----------------------------------------|
//! | `Class`              | every method of `Class`, in any module |
//! | `Module.Class`       | every method of `Module.Class`         |
//! | `Class/method`       | one method                             |
//! | `Module.Class/method`| one method                             |
//!
//! Several selections are separated by commas.

use crate::entry::TestCaseEntry;

/// One parsed selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTest {
    module: Option<String>,
    class: String,
    method: Option<String>,
}

impl SelectedTest {
    /// Returns `None` for selections with more than two `/` components.
    pub fn parse(selection: &str) -> Option<Self> {
        let mut components = selection.split('/');
        let class_part = components.next()?.trim();
        let method = components.next().map(|m| m.trim().to_string());
        if components.next().is_some() || class_part.is_empty() {
            return None;
        }

        let (module, class) = match class_part.split_once('.') {
            Some((module, class)) => (Some(module.to_string()), class.to_string()),
            None => (None, class_part.to_string()),
        };
        Some(Self {
            module,
            class,
            method,
        })
    }

    pub fn matches(&self, module: &str, class: &str, method: &str) -> bool {
        self.module.as_deref().is_none_or(|m| m == module)
            && self.class == class
            && self.method.as_deref().is_none_or(|m| m == method)
    }
}

/// Which tests a run includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFilter {
    All,
    Selected(Vec<SelectedTest>),
}

impl TestFilter {
    /// No selection, or an empty one, selects everything. Malformed parts
    /// select nothing.
    pub fn parse(selection: Option<&str>) -> Self {
        let Some(selection) = selection.map(str::trim).filter(|s| !s.is_empty()) else {
            return TestFilter::All;
        };
        let selected = selection
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let parsed = SelectedTest::parse(part);
                if parsed.is_none() {
                    tracing::debug!(selection = part, "selection matches no tests");
                }
                parsed
            })
            .collect();
        TestFilter::Selected(selected)
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, TestFilter::Selected(_))
    }

    pub fn includes(&self, module: &str, class: &str, method: &str) -> bool {
        match self {
            TestFilter::All => true,
            TestFilter::Selected(selected) => {
                selected.iter().any(|s| s.matches(module, class, method))
            }
        }
    }

    /// Entries narrowed to the included tests. Entries left empty are dropped.
    pub fn filter_entries(
        &self,
        entries: &[TestCaseEntry],
        default_module: &str,
    ) -> Vec<TestCaseEntry> {
        entries
            .iter()
            .filter_map(|entry| {
                let mut entry = entry.clone();
                let module = entry.resolved_module(default_module).to_string();
                let class = entry.class_name().to_string();
                entry.retain_tests(|test| self.includes(&module, &class, test.method_name()));
                (!entry.tests().is_empty()).then_some(entry)
            })
            .collect()
    }
}
