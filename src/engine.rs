//! Sequential plan execution.

use crate::data::RuleData;
use crate::error::Result;
use crate::plan::Plan;
use std::fmt;
use std::time::Instant;

/// Applies a plan's rules, in insertion order, to a data context.
///
/// There is no rollback: if a rule fails, the rules before it have already
/// written their outputs and the error is returned unchanged.
pub struct RuleEngine<'a, T> {
    plan: &'a Plan<T>,
}

impl<T> fmt::Debug for RuleEngine<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("plan", &self.plan)
            .finish()
    }
}

impl<'a, T> RuleEngine<'a, T> {
    pub fn new(plan: &'a Plan<T>) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &'a Plan<T> {
        self.plan
    }

    /// Run every rule against `data` and hand the same context back.
    ///
    /// # Errors
    ///
    /// The first error raised by a rule.
    pub fn run<'d>(&self, data: &'d mut RuleData<T>) -> Result<&'d mut RuleData<T>> {
        let span = tracing::info_span!(
            "plan",
            name = self.plan.name().unwrap_or("<unnamed>"),
            rules = self.plan.len()
        );
        let _guard = span.enter();
        let start = Instant::now();

        for (index, rule) in self.plan.iter().enumerate() {
            tracing::debug!(
                index,
                kind = rule.kind(),
                name = rule.meta().name.as_deref().unwrap_or(""),
                "applying rule"
            );
            if let Err(err) = rule.apply(data) {
                tracing::error!(index, kind = rule.kind(), error = %err, "rule failed");
                return Err(err);
            }
        }

        tracing::debug!(elapsed_ms = start.elapsed().as_millis(), "plan finished");
        Ok(data)
    }
}
