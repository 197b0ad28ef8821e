//! Slug derivation for new specifications (spec §4.E, grounded on
//! `spec_manager.py`'s `create_specification`).

/// Lowercase the name, turn runs of whitespace into a single hyphen, strip
/// any remaining filesystem-unsafe characters, and collapse/trim hyphens.
#[must_use]
pub fn derive_slug(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut last_was_hyphen = false;

    for c in lowered.chars() {
        if c.is_whitespace() {
            if !last_was_hyphen {
                slug.push('-');
                last_was_hyphen = true;
            }
        } else if c.is_ascii_alphanumeric() || c == '-' {
            slug.push(c);
            last_was_hyphen = c == '-';
        }
        // everything else (punctuation, emoji, etc.) is dropped
    }

    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }

    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates_spaces() {
        assert_eq!(derive_slug("Todo App"), "todo-app");
    }

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(derive_slug("My/Spec: v2!"), "myspec-v2");
    }

    #[test]
    fn collapses_repeated_separators() {
        assert_eq!(derive_slug("  Spacey   Name  "), "spacey-name");
    }
}
