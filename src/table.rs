//! Relabeling probability table
//!
//! Multi-valued map from an input species code to an ordered bucket of
//! (output code, probability formula) entries. Code 0 is the fallback bucket.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::formula::{Formula, FormulaCompiler};
use crate::PidError;

/// Code of the fallback bucket
pub const FALLBACK_CODE: i32 = 0;

/// Expression installed when no fallback rule is configured
pub const FALLBACK_EXPRESSION: &str = "1.0";

/// One configured `(input, output, formula)` triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32, String)", into = "(i32, i32, String)")]
pub struct MapRule {
    pub input: i32,
    pub output: i32,
    pub formula: String,
}

impl MapRule {
    pub fn new(input: i32, output: i32, formula: impl Into<String>) -> Self {
        Self {
            input,
            output,
            formula: formula.into(),
        }
    }
}

impl From<(i32, i32, String)> for MapRule {
    fn from((input, output, formula): (i32, i32, String)) -> Self {
        Self {
            input,
            output,
            formula,
        }
    }
}

impl From<MapRule> for (i32, i32, String) {
    fn from(rule: MapRule) -> Self {
        (rule.input, rule.output, rule.formula)
    }
}

#[derive(Clone)]
pub struct TableEntry {
    /// Output code; 0 keeps the input code
    pub output: i32,
    pub expression: String,
    formula: Arc<dyn Formula>,
}

impl TableEntry {
    pub fn probability(&self, pt: f64, eta: f64, phi: f64, e: f64) -> f64 {
        self.formula.evaluate(pt, eta, phi, e)
    }
}

impl fmt::Debug for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableEntry")
            .field("output", &self.output)
            .field("expression", &self.expression)
            .finish()
    }
}

/// Which bucket answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Conjugate,
    Fallback,
}

/// Read-only after construction
#[derive(Debug, Clone, Default)]
pub struct ProbabilityTable {
    buckets: BTreeMap<i32, Vec<TableEntry>>,
}

impl ProbabilityTable {
    /// Compile every rule, grouping by input code in configuration order.
    /// A fallback `(0 -> 0, "1.0")` entry is added when code 0 is missing.
    pub fn build(rules: &[MapRule], compiler: &dyn FormulaCompiler) -> Result<Self, PidError> {
        let mut buckets: BTreeMap<i32, Vec<TableEntry>> = BTreeMap::new();

        for rule in rules {
            let formula = compiler.compile(&rule.formula)?;
            buckets.entry(rule.input).or_default().push(TableEntry {
                output: rule.output,
                expression: rule.formula.clone(),
                formula,
            });
        }

        if !buckets.contains_key(&FALLBACK_CODE) {
            tracing::debug!("no fallback bucket configured, installing constant {FALLBACK_EXPRESSION}");
            let formula = compiler.compile(FALLBACK_EXPRESSION)?;
            buckets.insert(
                FALLBACK_CODE,
                vec![TableEntry {
                    output: FALLBACK_CODE,
                    expression: FALLBACK_EXPRESSION.to_string(),
                    formula,
                }],
            );
        }

        tracing::debug!(rules = rules.len(), buckets = buckets.len(), "probability table built");
        Ok(Self { buckets })
    }

    /// Bucket for `code`: exact match, then charge conjugate, then fallback
    pub fn resolve(&self, code: i32) -> (Lookup, &[TableEntry]) {
        if let Some(bucket) = self.buckets.get(&code) {
            return (Lookup::Exact, bucket);
        }
        if let Some(bucket) = self.buckets.get(&code.wrapping_neg()) {
            return (Lookup::Conjugate, bucket);
        }
        let fallback = self
            .buckets
            .get(&FALLBACK_CODE)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        (Lookup::Fallback, fallback)
    }

    pub fn bucket(&self, code: i32) -> &[TableEntry] {
        self.resolve(code).1
    }

    /// Configured input codes, ascending
    pub fn codes(&self) -> impl Iterator<Item = i32> + '_ {
        self.buckets.keys().copied()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
