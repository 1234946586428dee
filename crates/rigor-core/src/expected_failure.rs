//! Expected-failure scopes.
//!
//! A test can declare that issues it is about to cause are known. Each
//! declaration pushes an [`ExpectedFailureContext`]; while it is on the stack,
//! matching issues are recorded as suppressed and do not fail the test.
//!
//! The stack is partitioned by thread:
//!
//! ```text
//!   primary partition          thread partitions
//!   ┌──────────────┐           ┌───────────┐ ┌───────────┐
//!   │ ctx 7        │           │ T2: ctx 9 │ │ T3: ctx 8 │
//!   │ ctx 3        │           └───────────┘ └───────────┘
//!   └──────────────┘
//! ```
//!
//! Contexts pushed on the test's primary thread land in the primary partition
//! and match issues from any thread. Contexts pushed elsewhere only match
//! issues recorded on the thread that pushed them. Among the candidates the
//! newest context (highest id) wins.

use crate::subsystem::CaseId;
use rigor_proto::{Issue, IssueKind, SourceLocation};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Predicate deciding whether an issue is the one expected.
pub type IssueMatcher = Arc<dyn Fn(&Issue) -> bool + Send + Sync>;

/// Identity of a pushed context. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// How an expected-failure context matches and reports.
#[derive(Clone)]
pub struct ExpectedFailureOptions {
    /// Decides which issues the context absorbs. Matches everything by default.
    pub issue_matcher: IssueMatcher,

    /// Disabled contexts are pushed but never match.
    pub is_enabled: bool,

    /// Strict contexts that match nothing record an unmatched-expected-failure issue.
    pub is_strict: bool,
}

impl ExpectedFailureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that tolerate the expected failure not happening.
    pub fn non_strict() -> Self {
        Self {
            is_strict: false,
            ..Self::default()
        }
    }

    pub fn with_matcher(mut self, matcher: impl Fn(&Issue) -> bool + Send + Sync + 'static) -> Self {
        self.issue_matcher = Arc::new(matcher);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.is_strict = strict;
        self
    }
}

impl Default for ExpectedFailureOptions {
    fn default() -> Self {
        Self {
            issue_matcher: Arc::new(|_| true),
            is_enabled: true,
            is_strict: true,
        }
    }
}

impl fmt::Debug for ExpectedFailureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedFailureOptions")
            .field("is_enabled", &self.is_enabled)
            .field("is_strict", &self.is_strict)
            .finish_non_exhaustive()
    }
}

/// One "expect failure" declaration.
#[derive(Debug, Clone)]
pub struct ExpectedFailureContext {
    id: ContextId,
    reason: Option<String>,
    options: ExpectedFailureOptions,
    thread: ThreadId,
    case: Option<CaseId>,
    location: SourceLocation,
    matched: bool,
}

impl ExpectedFailureContext {
    /// Creates a context owned by the current thread.
    pub fn new(
        reason: Option<String>,
        options: ExpectedFailureOptions,
        case: Option<CaseId>,
        location: SourceLocation,
    ) -> Self {
        Self {
            id: ContextId::next(),
            reason: reason.filter(|r| !r.is_empty()),
            options,
            thread: std::thread::current().id(),
            case,
            location,
            matched: false,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn has_matched(&self) -> bool {
        self.matched
    }

    fn matches(&self, issue: &Issue) -> bool {
        self.options.is_enabled && (self.options.issue_matcher)(issue)
    }

    /// True when closing this context must be reported.
    pub fn is_unmatched_strict(&self) -> bool {
        self.options.is_enabled && self.options.is_strict && !self.matched
    }

    /// Issue recorded when a strict context closes without a match.
    pub fn unmatched_issue(&self) -> Issue {
        let description = match &self.reason {
            Some(reason) => format!("Expected failure was not matched: {reason}"),
            None => "Expected failure was not matched".to_string(),
        };
        Issue::new(IssueKind::UnmatchedExpectedFailure, description)
            .with_location(self.location.clone())
    }
}

/// Thread-partitioned stack of expected-failure contexts.
///
/// Plain data: callers serialize access (the engine keeps it behind the
/// subsystem lock).
#[derive(Debug, Default)]
pub struct ExpectedFailureStack {
    primary: Vec<ExpectedFailureContext>,
    threads: HashMap<ThreadId, Vec<ExpectedFailureContext>>,
}

impl ExpectedFailureStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `context` onto the primary partition or onto its thread's own.
    pub fn push(&mut self, context: ExpectedFailureContext, on_primary_thread: bool) -> ContextId {
        let id = context.id;
        if on_primary_thread {
            self.primary.push(context);
        } else {
            self.threads.entry(context.thread).or_default().push(context);
        }
        id
    }

    /// Removes the context with `id` from whichever partition holds it.
    pub fn pop(&mut self, id: ContextId) -> Option<ExpectedFailureContext> {
        if let Some(pos) = self.primary.iter().position(|c| c.id == id) {
            return Some(self.primary.remove(pos));
        }

        let mut emptied = None;
        let mut popped = None;
        for (thread, contexts) in &mut self.threads {
            if let Some(pos) = contexts.iter().position(|c| c.id == id) {
                popped = Some(contexts.remove(pos));
                if contexts.is_empty() {
                    emptied = Some(*thread);
                }
                break;
            }
        }
        if let Some(thread) = emptied {
            self.threads.remove(&thread);
        }
        popped
    }

    /// Finds the newest context visible from `thread` that matches `issue`
    /// and marks it as matched.
    pub fn match_issue(&mut self, issue: &Issue, thread: ThreadId) -> Option<ContextId> {
        let own = self.threads.get_mut(&thread).into_iter().flatten();
        let candidate = self
            .primary
            .iter_mut()
            .chain(own)
            .filter(|c| c.matches(issue))
            .max_by_key(|c| c.id)?;
        candidate.matched = true;
        Some(candidate.id)
    }

    /// Like [`match_issue`](Self::match_issue) without marking anything.
    pub fn is_expected(&self, issue: &Issue, thread: ThreadId) -> bool {
        let own = self.threads.get(&thread).into_iter().flatten();
        self.primary.iter().chain(own).any(|c| c.matches(issue))
    }

    /// Removes every context owned by `case`, newest first.
    pub fn drain_case(&mut self, case: CaseId) -> Vec<ExpectedFailureContext> {
        let mut drained: Vec<ExpectedFailureContext> = Vec::new();

        let (owned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.primary)
            .into_iter()
            .partition(|c| c.case == Some(case));
        self.primary = kept;
        drained.extend(owned);

        for contexts in self.threads.values_mut() {
            let (owned, kept): (Vec<_>, Vec<_>) = std::mem::take(contexts)
                .into_iter()
                .partition(|c| c.case == Some(case));
            *contexts = kept;
            drained.extend(owned);
        }
        self.threads.retain(|_, contexts| !contexts.is_empty());

        drained.sort_by(|a, b| b.id.cmp(&a.id));
        drained
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.threads.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(reason: &str, options: ExpectedFailureOptions) -> ExpectedFailureContext {
        ExpectedFailureContext::new(
            Some(reason.to_string()),
            options,
            None,
            SourceLocation::caller(),
        )
    }

    fn issue(text: &str) -> Issue {
        Issue::assertion_failure(text)
    }

    #[test]
    fn test_ids_are_monotonic() {
        let a = context("a", ExpectedFailureOptions::default());
        let b = context("b", ExpectedFailureOptions::default());
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_inner_context_wins_and_outer_stays_unmatched() {
        let mut stack = ExpectedFailureStack::new();
        let thread = std::thread::current().id();

        let outer = stack.push(context("outer", ExpectedFailureOptions::default()), true);
        let inner = stack.push(context("inner", ExpectedFailureOptions::default()), true);

        assert_eq!(stack.match_issue(&issue("boom"), thread), Some(inner));

        let inner_ctx = stack.pop(inner).unwrap();
        assert!(inner_ctx.has_matched());
        let outer_ctx = stack.pop(outer).unwrap();
        assert!(!outer_ctx.has_matched());
        assert!(outer_ctx.is_unmatched_strict());
    }

    #[test]
    fn test_matcher_filters_issues() {
        let mut stack = ExpectedFailureStack::new();
        let thread = std::thread::current().id();
        let options = ExpectedFailureOptions::default()
            .with_matcher(|issue| issue.compact_description.contains("network"));
        let id = stack.push(context("flaky network", options), true);

        assert_eq!(stack.match_issue(&issue("disk full"), thread), None);
        assert_eq!(stack.match_issue(&issue("network down"), thread), Some(id));
    }

    #[test]
    fn test_outer_matches_when_inner_rejects() {
        let mut stack = ExpectedFailureStack::new();
        let thread = std::thread::current().id();
        let outer = stack.push(context("outer", ExpectedFailureOptions::default()), true);
        let picky = ExpectedFailureOptions::default().with_matcher(|_| false);
        stack.push(context("inner", picky), true);

        assert_eq!(stack.match_issue(&issue("boom"), thread), Some(outer));
    }

    #[test]
    fn test_disabled_context_never_matches_and_is_not_reported() {
        let mut stack = ExpectedFailureStack::new();
        let thread = std::thread::current().id();
        let id = stack.push(
            context("off", ExpectedFailureOptions::default().enabled(false)),
            true,
        );

        assert!(!stack.is_expected(&issue("boom"), thread));
        assert_eq!(stack.match_issue(&issue("boom"), thread), None);
        assert!(!stack.pop(id).unwrap().is_unmatched_strict());
    }

    #[test]
    fn test_non_strict_is_not_reported() {
        let mut stack = ExpectedFailureStack::new();
        let id = stack.push(context("maybe", ExpectedFailureOptions::non_strict()), true);
        assert!(!stack.pop(id).unwrap().is_unmatched_strict());
    }

    #[test]
    fn test_secondary_partitions_are_isolated() {
        let mut stack = ExpectedFailureStack::new();
        let main_thread = std::thread::current().id();

        // Pushed from a helper thread: only issues on that thread match it.
        let helper_context = std::thread::spawn(|| {
            ExpectedFailureContext::new(
                Some("helper".into()),
                ExpectedFailureOptions::default(),
                None,
                SourceLocation::unknown(),
            )
        })
        .join()
        .unwrap();
        let helper_thread = helper_context.thread();
        let helper_id = stack.push(helper_context, false);

        assert!(!stack.is_expected(&issue("boom"), main_thread));
        assert!(stack.is_expected(&issue("boom"), helper_thread));

        // Primary contexts are visible from every thread.
        let primary_id = stack.push(context("primary", ExpectedFailureOptions::default()), true);
        assert!(stack.is_expected(&issue("boom"), main_thread));

        // From the helper thread both are visible and the newest wins.
        let matched = stack.match_issue(&issue("boom"), helper_thread).unwrap();
        assert_eq!(matched, primary_id);
        assert!(helper_id < primary_id);
    }

    #[test]
    fn test_drain_case_returns_newest_first() {
        let mut stack = ExpectedFailureStack::new();
        let case = CaseId::for_tests(42);
        let first = ExpectedFailureContext::new(
            None,
            ExpectedFailureOptions::default(),
            Some(case),
            SourceLocation::unknown(),
        );
        let second = ExpectedFailureContext::new(
            None,
            ExpectedFailureOptions::default(),
            Some(case),
            SourceLocation::unknown(),
        );
        let first_id = stack.push(first, true);
        let second_id = stack.push(second, true);
        stack.push(context("someone else", ExpectedFailureOptions::default()), true);

        let drained: Vec<ContextId> = stack.drain_case(case).iter().map(|c| c.id()).collect();
        assert_eq!(drained, vec![second_id, first_id]);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_unmatched_issue_text() {
        let ctx = context("known bug", ExpectedFailureOptions::default());
        let issue = ctx.unmatched_issue();
        assert_eq!(issue.kind, IssueKind::UnmatchedExpectedFailure);
        assert_eq!(issue.compact_description, "Expected failure was not matched: known bug");
    }
}
