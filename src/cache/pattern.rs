//! Key Pattern Module
//!
//! Glob matching used by `empty_by_match` on the embedded backend. Follows the
//! pattern rules of Redis `SCAN MATCH` so both backends agree on what a
//! pattern selects.

// == Glob Match ==
/// Returns true if `key` matches the glob `pattern`.
///
/// Supported syntax: `*` (any run), `?` (any single char), `[abc]`, `[a-z]`,
/// `[^abc]` and `\` to escape the next character.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // Position after the last `*` and the key index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    while p < pattern.len() && pattern[p] == '*' {
                        p += 1;
                    }
                    if p == pattern.len() {
                        return true;
                    }
                    backtrack = Some((p, k));
                    continue;
                }
                '?' => {
                    p += 1;
                    k += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&pattern, p, key[k]) {
                        if matched {
                            p = next;
                            k += 1;
                            continue;
                        }
                    } else if key[k] == '[' {
                        // unterminated class, treat `[` literally
                        p += 1;
                        k += 1;
                        continue;
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == key[k] {
                        p += 2;
                        k += 1;
                        continue;
                    }
                }
                c => {
                    if c == key[k] {
                        p += 1;
                        k += 1;
                        continue;
                    }
                }
            }
        }

        match backtrack {
            Some((star_p, star_k)) => {
                backtrack = Some((star_p, star_k + 1));
                p = star_p;
                k = star_k + 1;
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Longest literal prefix every key matching `pattern` starts with.
///
/// Lets the embedded store narrow a key scan to one range of the B-tree.
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '[', '\\']) {
        Some(end) => &pattern[..end],
        None => pattern,
    }
}

/// Matches `c` against the class starting at `pattern[start] == '['`.
///
/// Returns whether it matched and the index just past the closing `]`, or
/// `None` when the class is never closed.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = i < pattern.len() && pattern[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        if pattern[i] == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;

        let mut lo = pattern[i];
        if lo == '\\' && i + 1 < pattern.len() {
            i += 1;
            lo = pattern[i];
        }

        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let hi = pattern[i + 2];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }

    None
}
