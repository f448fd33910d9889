//! Pluggable registry of advice rules.
//!
//! Every analyzer turns its numeric results into a context value and runs it
//! through a [`RuleSet`]. Each rule looks at the context and pushes zero or
//! more tagged advice values, so new advice can be added and tested without
//! touching the numeric core.

use std::fmt;

/// A single advice rule evaluated against an analysis context.
pub trait Rule<C, O>: Send + Sync {
    fn evaluate(&self, context: &C, output: &mut Vec<O>);
}

impl<C, O, F> Rule<C, O> for F
where
    F: Fn(&C, &mut Vec<O>) + Send + Sync,
{
    fn evaluate(&self, context: &C, output: &mut Vec<O>) {
        self(context, output)
    }
}

/// Ordered collection of rules. Output order follows registration order.
pub struct RuleSet<C, O> {
    rules: Vec<(&'static str, Box<dyn Rule<C, O>>)>,
}

impl<C, O> RuleSet<C, O> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule under a name, builder style.
    pub fn with_rule(mut self, name: &'static str, rule: impl Rule<C, O> + 'static) -> Self {
        self.push(name, rule);
        self
    }

    pub fn push(&mut self, name: &'static str, rule: impl Rule<C, O> + 'static) {
        self.rules.push((name, Box::new(rule)));
    }

    /// Drop a rule by name, returning whether it was registered.
    pub fn remove(&mut self, name: &str) -> bool {
        let initial_len = self.rules.len();
        self.rules.retain(|(rule_name, _)| *rule_name != name);
        self.rules.len() != initial_len
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, context: &C) -> Vec<O> {
        let mut output = Vec::new();
        for (_, rule) in &self.rules {
            rule.evaluate(context, &mut output);
        }
        output
    }

    /// Like [`RuleSet::evaluate`] but never returns an empty list.
    pub fn evaluate_or(&self, context: &C, fallback: impl FnOnce() -> O) -> Vec<O> {
        let mut output = self.evaluate(context);
        if output.is_empty() {
            output.push(fallback());
        }
        output
    }
}

impl<C, O> Default for RuleSet<C, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, O> fmt::Debug for RuleSet<C, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
