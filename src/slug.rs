//! URL slugs for property listings.

/// Lowercase, alphanumeric, hyphen-separated. Consecutive separators
/// collapse; leading/trailing hyphens are trimmed.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_hyphen = true; // suppress leading hyphen
    for c in name.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("listing");
    }
    out
}

/// First slug derived from `name` that `taken` does not contain: the bare
/// slug, then `-1`, `-2`, ...
pub fn unique_slug(name: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    let base = slugify(name);
    if !taken(&base) {
        return base;
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
