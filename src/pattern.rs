//! Glob patterns
//!
//! Decides index membership from a key. Supported syntax:
//! - `*` matches any run of characters (including none)
//! - `?` matches exactly one character
//! - `\x` matches `x` literally

/// Check whether `key` matches the glob `pattern`
pub fn matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pat: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // Resume point of the last `*`: (pattern index after it, key index it consumed up to)
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pat.len() {
            match pat[p] {
                '*' => {
                    star = Some((p + 1, k));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    k += 1;
                    continue;
                }
                '\\' if p + 1 < pat.len() => {
                    if pat[p + 1] == key[k] {
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

        // Mismatch: let the last star swallow one more character
        match star {
            Some((after_star, consumed)) => {
                p = after_star;
                k = consumed + 1;
                star = Some((after_star, consumed + 1));
            }
            None => return false,
        }
    }

    pat[p..].iter().all(|&c| c == '*')
}

/// Match with ASCII case folding on both sides
pub fn matches_ignore_case(pattern: &str, key: &str) -> bool {
    matches(&pattern.to_lowercase(), &key.to_lowercase())
}

/// The literal text before the first wildcard or escape
///
/// Every key matching `pattern` starts with this prefix.
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '\\']) {
        Some(pos) => &pattern[..pos],
        None => pattern,
    }
}

/// The smallest string greater than every string starting with `prefix`
///
/// None when no such bound exists (empty prefix, or only `char::MAX`s).
pub fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let mut next = last as u32 + 1;
        if (0xD800..=0xDFFF).contains(&next) {
            next = 0xE000;
        }
        if let Some(c) = char::from_u32(next) {
            chars.push(c);
            return Some(chars.into_iter().collect());
        }
    }
    None
}
