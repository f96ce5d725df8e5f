//! Run-scoped state shared by every class transformed in one run.

use rustc_hash::FxHashSet;

/// State that outlives a single class: the advisory warning dedup set and
/// run statistics.
///
/// A session is created by the caller and passed to each
/// [`crate::compiler::ClassTransformer`] of the run; dropping it resets
/// everything.
#[derive(Debug, Default)]
pub struct TransformSession {
    reported: FxHashSet<String>,
    transformed_methods: usize,
    renamed_methods: usize,
    shims: usize,
}

impl TransformSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports that the original entry point `owner.name desc` is invoked
    /// from `caller`, code that was not rewritten and still reaches the
    /// converting prefix.
    ///
    /// Logs once per distinct report and returns `true` when it was new.
    pub fn report_wrong_invocation(&mut self, owner: &str, name: &str, desc: &str, caller: &str) -> bool {
        let key = format!("{owner}.{name} {desc} at {caller}");
        if self.reported.contains(&key) {
            return false;
        }
        log::warn!("Incorrect invocation: {key}");
        self.reported.insert(key);
        true
    }

    pub(crate) fn record_transformed(&mut self, renamed: bool) {
        self.transformed_methods += 1;
        if renamed {
            self.renamed_methods += 1;
        }
    }

    pub(crate) fn record_shim(&mut self) {
        self.shims += 1;
    }

    /// Methods rewritten so far.
    #[must_use]
    pub const fn transformed_methods(&self) -> usize {
        self.transformed_methods
    }

    /// Rewritten methods that kept their descriptor and were renamed.
    #[must_use]
    pub const fn renamed_methods(&self) -> usize {
        self.renamed_methods
    }

    /// Original entry points that received a dispatcher or instrumentation.
    #[must_use]
    pub const fn shims(&self) -> usize {
        self.shims
    }

    /// Distinct wrong invocations reported so far.
    #[must_use]
    pub fn reported_invocations(&self) -> usize {
        self.reported.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once() {
        let mut session = TransformSession::new();
        assert!(session.report_wrong_invocation("a/B", "run", "(J)V", "a/C#main"));
        assert!(!session.report_wrong_invocation("a/B", "run", "(J)V", "a/C#main"));
        assert!(session.report_wrong_invocation("a/B", "run", "(J)V", "a/D#main"));
        assert_eq!(session.reported_invocations(), 2);
    }

    #[test]
    fn test_counters() {
        let mut session = TransformSession::new();
        session.record_transformed(false);
        session.record_transformed(true);
        session.record_shim();
        assert_eq!(session.transformed_methods(), 2);
        assert_eq!(session.renamed_methods(), 1);
        assert_eq!(session.shims(), 1);
    }
}
