//! Output equivalence check
//!
//! Compares normalized actual output against normalized expected output
//! with exact string equality. The comparison is deliberately syntactic:
//! outputs that are semantically equal but spelled differently (e.g.
//! `1.0` vs `1`) are judged unequal. Whether such outputs should pass is
//! a product decision, not something to fix here.

use crate::normalizer::normalize;

/// Returns true when the two outputs are equal after normalization.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
