//! Parsing of libtest `--list --format terse` output.

use std::collections::HashSet;

/// Extracts test case names from terse libtest listings.
///
/// Lines look like `path::to::case: test`. Benchmarks and anything that is
/// not a listing line are ignored. When a cargo invocation covers several
/// test binaries the same name can appear more than once; only the first
/// occurrence is kept.
pub fn parse_test_list(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    output
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix(": test"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert((*name).to_string()))
        .map(str::to_string)
        .collect()
}
