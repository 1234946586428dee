//! Building the root suite and listing tests.
//!
//! The unfiltered root suite has one more level than a filtered one:
//!
//! ```text
//!   All tests                      Selected tests
//!   └── {bundle}.xctest            ├── Tests.Alpha
//!       ├── Tests.Alpha            │   └── test_a
//!       │   ├── test_a             └── Other.Beta
//!       │   └── test_b                 └── test_a
//!       └── Other.Beta
//!           └── test_a
//! ```

use crate::config::RigorConfig;
use crate::entry::TestCaseEntry;
use crate::filtering::TestFilter;
use crate::suite::{Test, TestSuite};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("failed to serialize test listing: {0}")]
    Json(#[from] serde_json::Error),
}

/// Builds the suite tree a run executes.
pub fn build_root_suite(
    entries: &[TestCaseEntry],
    filter: &TestFilter,
    config: &RigorConfig,
) -> TestSuite {
    let selected = filter.filter_entries(entries, &config.module_name);
    let classes = selected
        .iter()
        .map(|entry| entry.to_suite(&config.module_name));

    if filter.is_filtered() {
        classes.fold(TestSuite::new("Selected tests"), |root, class| root.with(class))
    } else {
        let bundle = classes.fold(TestSuite::new(config.bundle_suite_name()), |bundle, class| {
            bundle.with(class)
        });
        TestSuite::new("All tests").with(bundle)
    }
}

/// `Module.Class/method` for every test, in registration order.
pub fn list_tests(entries: &[TestCaseEntry], config: &RigorConfig) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| {
            let module = entry.resolved_module(&config.module_name);
            entry
                .tests()
                .iter()
                .map(move |test| format!("{module}.{}/{}", entry.class_name(), test.method_name()))
        })
        .collect()
}

/// The flat listing printed by `--list-tests`.
pub fn human_readable_listing(entries: &[TestCaseEntry], config: &RigorConfig) -> String {
    let tests = list_tests(entries, config);
    let noun = if tests.len() == 1 { "test" } else { "tests" };
    let mut out = format!(
        "Listing {} {noun} in {}:\n\n",
        tests.len(),
        config.bundle_suite_name()
    );
    for test in tests {
        out.push_str(&test);
        out.push('\n');
    }
    out
}

/// JSON shape of a listed suite or test method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListedTest {
    Suite { name: String, tests: Vec<ListedTest> },
    Case { name: String },
}

impl From<&Test> for ListedTest {
    fn from(test: &Test) -> Self {
        match test {
            Test::Case(case) => ListedTest::Case {
                name: case.method_name().to_string(),
            },
            Test::Suite(suite) => ListedTest::from(suite),
        }
    }
}

impl From<&TestSuite> for ListedTest {
    fn from(suite: &TestSuite) -> Self {
        ListedTest::Suite {
            name: suite.name().to_string(),
            tests: suite.tests().iter().map(ListedTest::from).collect(),
        }
    }
}

/// The nested listing printed by `--dump-tests-json`.
pub fn json_listing(root: &TestSuite) -> Result<String, ListingError> {
    Ok(serde_json::to_string(&ListedTest::from(root))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<TestCaseEntry> {
        vec![
            TestCaseEntry::new("Alpha")
                .test("test_a", |_| Ok(()))
                .test("test_b", |_| Ok(())),
            TestCaseEntry::new("Beta")
                .module("Other")
                .test("test_a", |_| Ok(())),
            TestCaseEntry::new("Empty"),
        ]
    }

    fn config() -> RigorConfig {
        RigorConfig {
            bundle_name: "Demo".into(),
            ..RigorConfig::default()
        }
    }

    #[test]
    fn test_unfiltered_root_has_bundle_level() {
        let root = build_root_suite(&entries(), &TestFilter::All, &config());
        assert_eq!(root.name(), "All tests");
        let Test::Suite(bundle) = &root.tests()[0] else {
            panic!("expected bundle suite");
        };
        assert_eq!(bundle.name(), "Demo.xctest");
        let classes: Vec<String> = bundle.tests().iter().map(Test::name).collect();
        assert_eq!(classes, vec!["Tests.Alpha", "Other.Beta"]);
    }

    #[test]
    fn test_filtered_root() {
        let filter = TestFilter::parse(Some("Beta/test_a"));
        let root = build_root_suite(&entries(), &filter, &config());
        assert_eq!(root.name(), "Selected tests");
        assert_eq!(root.test_case_count(), 1);
        assert_eq!(root.tests()[0].name(), "Other.Beta");
    }

    #[test]
    fn test_human_readable() {
        let listing = human_readable_listing(&entries(), &config());
        assert_eq!(
            listing,
            "Listing 3 tests in Demo.xctest:\n\nTests.Alpha/test_a\nTests.Alpha/test_b\nOther.Beta/test_a\n"
        );
    }

    #[test]
    fn test_json_shape() {
        let filter = TestFilter::parse(Some("Alpha/test_b"));
        let root = build_root_suite(&entries(), &filter, &config());
        let json: serde_json::Value = serde_json::from_str(&json_listing(&root).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Selected tests",
                "tests": [{"name": "Tests.Alpha", "tests": [{"name": "test_b"}]}]
            })
        );
    }
}
