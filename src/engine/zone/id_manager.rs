//! Identifier allocation shared by every origin that writes into the namespace.

use std::collections::BTreeSet;

/// Fallback slug for names that contain no usable characters.
const EMPTY_SLUG: &str = "zone";

/// Turns a display name into an identifier: lowercase ASCII alphanumerics, with
/// every other run of characters collapsed into a single `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// Hands out collision-free identifiers.
///
/// The manager itself only knows about reserved ids; the caller supplies a
/// `taken` predicate covering everything currently live, so a single allocator
/// can arbitrate between independently-populated partitions.
#[derive(Debug, Default, Clone)]
pub struct IdManager {
    reserved: BTreeSet<String>,
}

impl IdManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as never available for generated identifiers.
    pub fn reserve(&mut self, id: impl Into<String>) {
        self.reserved.insert(id.into());
    }

    pub fn is_reserved(&self, id: &str) -> bool {
        self.reserved.contains(id)
    }

    /// Returns `slugify(suggestion)` or, when that is taken, the first free
    /// `<slug>_2`, `<slug>_3`, ...
    pub fn generate(&self, suggestion: &str, taken: impl Fn(&str) -> bool) -> String {
        let base = slugify(suggestion);
        let unavailable = |id: &str| self.is_reserved(id) || taken(id);

        let mut proposal = base.clone();
        let mut attempt = 1;
        while unavailable(&proposal) {
            attempt += 1;
            proposal = format!("{base}_{attempt}");
        }
        proposal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("Office"), "office");
        assert_eq!(slugify("  Mom's  House!! "), "mom_s_house");
        assert_eq!(slugify("Zone 51"), "zone_51");
        assert_eq!(slugify("***"), "zone");
    }

    #[test]
    fn free_suggestion_is_used_as_is() {
        let ids = IdManager::new();
        assert_eq!(ids.generate("Office", |_| false), "office");
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let ids = IdManager::new();
        let taken = ["office", "office_2"];
        assert_eq!(ids.generate("Office", |id| taken.contains(&id)), "office_3");
    }

    #[test]
    fn reserved_ids_are_never_generated() {
        let mut ids = IdManager::new();
        ids.reserve("home");
        assert_eq!(ids.generate("Home", |_| false), "home_2");
        assert!(ids.is_reserved("home"));
    }
}
