//! Public Slugs
//!
//! `<recipient>-<sender>-<suffix>`: the readable part is normalized from the
//! names, the suffix is 16 characters drawn from `[a-z0-9]` with the OS RNG
//! (about 82 bits). Collisions are not checked for.

use rand::Rng;
use rand::rngs::OsRng;

const SUFFIX_LEN: usize = 16;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const FALLBACK_BASE: &str = "flame";

/// Generate a fresh slug for a flame
pub fn generate(recipient_name: &str, sender_name: &str) -> String {
    let base = normalize(&format!("{recipient_name} {sender_name}"));
    format!("{base}-{}", random_suffix())
}

/// Lower-case, whitespace to `-`, keep `[a-z0-9-]`, collapse repeated `-`
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_whitespace() || c == '-' {
            '-'
        } else if c.is_ascii_alphanumeric() {
            c
        } else {
            continue;
        };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn random_suffix() -> String {
    let mut rng = OsRng;
    (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_url_safe(slug: &str) -> bool {
        slug.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn test_slug_shape() {
        let slug = generate("Alex", "Sam");
        let suffix = slug.strip_prefix("alex-sam-").unwrap();

        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(is_url_safe(&slug));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Mary Ann  O'Neil"), "mary-ann-oneil");
        assert_eq!(normalize("  Zoë & Jo  "), "zo-jo");
        assert_eq!(normalize("--a--b--"), "a-b");
        assert_eq!(normalize("心 ❤"), FALLBACK_BASE);
    }

    #[test]
    fn test_slugs_unique() {
        let slugs: HashSet<String> = (0..500).map(|_| generate("Alex", "Sam")).collect();
        assert_eq!(slugs.len(), 500);
    }

    #[test]
    fn test_non_ascii_names_still_url_safe() {
        let slug = generate("Ünïcödé", "名前");
        assert!(is_url_safe(&slug));
        assert!(!slug.starts_with('-'));
    }
}
