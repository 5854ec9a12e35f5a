//! URL slugs for schools.

const FALLBACK: &str = "school";

/// Lowercase ASCII alphanumerics joined by single dashes. Names with no
/// ASCII letters or digits (Arabic names, for instance) fall back to `school`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK.to_string()
    } else {
        slug
    }
}

/// First of `base`, `base-2`, `base-3`, ... not in `taken`.
pub fn next_available<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.as_ref() == candidate);

    if !is_taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// A user-supplied slug is accepted only when it is already in slug form.
pub fn is_valid(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_latin_names() {
        assert_eq!(slugify("Sunrise Academy"), "sunrise-academy");
        assert_eq!(slugify("  Al-Noor   School #2 "), "al-noor-school-2");
        assert_eq!(slugify("ÉCOLE Libre"), "cole-libre");
    }

    #[test]
    fn non_ascii_names_fall_back() {
        assert_eq!(slugify("مدرسة النور"), "school");
        assert_eq!(slugify("---"), "school");
    }

    #[test]
    fn collisions_get_numeric_suffix() {
        let taken = vec!["sunrise-academy".to_string(), "sunrise-academy-2".to_string()];
        assert_eq!(next_available("sunrise-academy", &taken), "sunrise-academy-3");
        assert_eq!(next_available("other", &taken), "other");
        assert_eq!(next_available("school", &["school"]), "school-2");
    }

    #[test]
    fn explicit_slugs_must_be_canonical() {
        assert!(is_valid("sunrise-academy"));
        assert!(!is_valid("Sunrise Academy"));
        assert!(!is_valid("-sunrise"));
        assert!(!is_valid(""));
    }
}
