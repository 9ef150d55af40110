//! `copy<N>_of_` name-collision convention.
//!
//! When a pasted object's id is taken, the CMS prefixes it with `copy_of_`,
//! then `copy2_of_`, `copy3_of_` and so on. Reproducing the rule keeps names
//! consistent with objects created through the CMS's own UI.

use regex::Regex;
use std::sync::LazyLock;

static COPY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^copy(\d*)_of_(.*)$").expect("valid regex"));

/// Split `copy<N>_of_<base>` into (N, base). A missing numeral is 1.
pub fn parse_copy_name(name: &str) -> Option<(u32, &str)> {
    let captures = COPY_NAME.captures(name)?;
    let digits = captures.get(1).map_or("", |m| m.as_str());
    let n = if digits.is_empty() {
        1
    } else {
        digits.parse().ok()?
    };
    let base = captures.get(2).map_or("", |m| m.as_str());
    Some((n, base))
}

/// Returns true for working-copy style names.
pub fn is_copy_name(name: &str) -> bool {
    parse_copy_name(name).is_some()
}

/// Next candidate after `name` collided.
pub fn next_candidate(name: &str) -> String {
    match parse_copy_name(name) {
        Some((n, base)) => format!("copy{}_of_{base}", n + 1),
        None => format!("copy_of_{name}"),
    }
}

/// First name, starting from `name`, that `is_taken` rejects.
pub fn collision_free(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = name.to_string();
    while is_taken(&candidate) {
        candidate = next_candidate(&candidate);
    }
    candidate
}
