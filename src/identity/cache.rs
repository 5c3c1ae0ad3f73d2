//! Nickname to account cache.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::fold;

/// Resolved accounts keyed by case-folded nickname.
///
/// Entries live until the nick parts, quits or the link drops. A rename
/// moves the entry, since the account behind the connection is unchanged.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: Mutex<HashMap<String, String>>,
}

impl IdentityCache {
    pub fn get(&self, nick: &str) -> Option<String> {
        self.entries.lock().get(&fold(nick)).cloned()
    }

    pub fn insert(&self, nick: &str, account: &str) {
        self.entries.lock().insert(fold(nick), account.to_owned());
    }

    pub fn remove(&self, nick: &str) -> Option<String> {
        self.entries.lock().remove(&fold(nick))
    }

    /// Move `old`'s entry to `new`. Returns whether there was one.
    pub fn rename(&self, old: &str, new: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.remove(&fold(old)) {
            Some(account) => {
                entries.insert(fold(new), account);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let cache = IdentityCache::default();
        cache.insert("Armin", "armin");
        assert_eq!(cache.get("armin").as_deref(), Some("armin"));
        assert_eq!(cache.get("ARMIN").as_deref(), Some("armin"));
    }

    #[test]
    fn test_rename_moves_entry() {
        let cache = IdentityCache::default();
        cache.insert("armin", "armin");

        assert!(cache.rename("armin", "armin_away"));
        assert_eq!(cache.get("armin"), None);
        assert_eq!(cache.get("armin_away").as_deref(), Some("armin"));

        assert!(!cache.rename("nobody", "somebody"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = IdentityCache::default();
        cache.insert("a", "x");
        cache.insert("b", "y");

        assert_eq!(cache.remove("a").as_deref(), Some("x"));
        assert_eq!(cache.remove("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }
}
