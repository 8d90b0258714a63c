//! Glob matching for instance paths and scope strings.
//!
//! `*` matches any run of characters (including `.`), `?` matches exactly
//! one character. Everything else matches itself.

/// Whether `scope` contains glob metacharacters.
pub fn has_wildcard(scope: &str) -> bool {
    scope.contains(['*', '?'])
}

/// Match `text` against the glob `pattern`.
pub fn is_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let mut pi = 0usize;
    let mut ti = 0usize;
    // Last `*` seen and the text position it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi = pi.saturating_add(1);
            }
            Some(&c) if c == '?' || t.get(ti) == Some(&c) => {
                pi = pi.saturating_add(1);
                ti = ti.saturating_add(1);
            }
            _ => match star {
                Some((sp, st)) => {
                    let next = st.saturating_add(1);
                    pi = sp.saturating_add(1);
                    ti = next;
                    star = Some((sp, next));
                }
                None => return false,
            },
        }
    }

    p.get(pi..).is_some_and(|rest| rest.iter().all(|&c| c == '*'))
}
