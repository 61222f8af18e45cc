//! Clip name helpers.
//!
//! Names inside a pool are unique. A colliding name gets a `" (N)"` suffix
//! which is bumped until the name is free: `Kick`, `Kick (1)`, `Kick (2)`.

/// Drops everything from the last `.` on. A name that would become empty is
/// returned unchanged.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Splits `"Kick (3)"` into `("Kick", 3)`. Only a positive integer in the
/// final `" (" digits ")"` group counts as a suffix.
pub fn split_numeric_suffix(name: &str) -> Option<(&str, u64)> {
    let inner = name.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let digits = &inner[open + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    (value > 0).then_some((&name[..open], value))
}

pub fn next_candidate(name: &str) -> String {
    match split_numeric_suffix(name)
        .and_then(|(base, value)| value.checked_add(1).map(|next| (base, next)))
    {
        Some((base, next)) => format!("{base} ({next})"),
        None => format!("{name} (1)"),
    }
}

/// Bumps the numeric suffix of `candidate` until `is_taken` no longer reports
/// a collision. Extensions are the caller's business.
pub fn uniquify(candidate: &str, mut is_taken: impl FnMut(&str) -> bool) -> String {
    let mut name = candidate.to_string();
    while is_taken(&name) {
        name = next_candidate(&name);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn strips_only_last_extension() {
        assert_eq!(strip_extension("Kick.wav"), "Kick");
        assert_eq!(strip_extension("Kick.final.flac"), "Kick.final");
        assert_eq!(strip_extension("Kick"), "Kick");
        assert_eq!(strip_extension(".wav"), ".wav");
    }

    #[test]
    fn parses_trailing_counter() {
        assert_eq!(split_numeric_suffix("Kick (3)"), Some(("Kick", 3)));
        assert_eq!(split_numeric_suffix("Kick (12) (7)"), Some(("Kick (12)", 7)));
        assert_eq!(split_numeric_suffix("Kick (0)"), None);
        assert_eq!(split_numeric_suffix("Kick (x)"), None);
        assert_eq!(split_numeric_suffix("Kick ()"), None);
        assert_eq!(split_numeric_suffix("Kick(3)"), None);
        assert_eq!(split_numeric_suffix("Kick"), None);
    }

    #[test]
    fn bumps_suffix() {
        assert_eq!(next_candidate("Kick"), "Kick (1)");
        assert_eq!(next_candidate("Kick (1)"), "Kick (2)");
        assert_eq!(next_candidate("Kick (0)"), "Kick (0) (1)");
        assert_eq!(
            next_candidate(&format!("Kick ({})", u64::MAX)),
            format!("Kick ({}) (1)", u64::MAX)
        );
    }

    #[test]
    fn uniquify_walks_until_free() {
        let taken: HashSet<&str> = HashSet::from(["Kick", "Kick (1)", "Kick (2)"]);
        assert_eq!(uniquify("Kick", |n| taken.contains(n)), "Kick (3)");
        assert_eq!(uniquify("Kick (1)", |n| taken.contains(n)), "Kick (3)");
        assert_eq!(uniquify("Snare", |n| taken.contains(n)), "Snare");
        assert_eq!(uniquify("Vox 2.0", |n| taken.contains(n)), "Vox 2.0");
    }
}
