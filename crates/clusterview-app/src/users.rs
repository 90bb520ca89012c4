// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
}

impl UserInfo {
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

type Observer = Box<dyn FnMut(&[String]) + Send>;

/// Keyed cache of owner display names. Writers go through `update`, which
/// reports the ids whose entry actually changed to every subscriber.
#[derive(Default)]
pub struct UserDirectory {
    users: BTreeMap<String, UserInfo>,
    observers: Vec<Observer>,
}

impl fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDirectory")
            .field("users", &self.users)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<&UserInfo> {
        self.users.get(username)
    }

    /// Display label for an owner, falling back to the raw id.
    pub fn display_name<'a>(&'a self, username: &'a str) -> &'a str {
        self.users
            .get(username)
            .map(UserInfo::label)
            .unwrap_or(username)
    }

    /// Ids from `usernames` with no cached entry yet, deduplicated.
    pub fn missing<'a, I>(&self, usernames: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut out = Vec::new();
        for username in usernames {
            if !self.users.contains_key(username) && !out.contains(username) {
                out.push(username.clone());
            }
        }
        out
    }

    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&[String]) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn update<I>(&mut self, users: I) -> Vec<String>
    where
        I: IntoIterator<Item = UserInfo>,
    {
        let mut changed = Vec::new();
        for user in users {
            if self.users.get(&user.username) == Some(&user) {
                continue;
            }
            changed.push(user.username.clone());
            self.users.insert(user.username.clone(), user);
        }
        if !changed.is_empty() {
            for observer in &mut self.observers {
                observer(&changed);
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{UserDirectory, UserInfo};
    use std::sync::{Arc, Mutex};

    fn user(username: &str, display_name: &str) -> UserInfo {
        UserInfo {
            username: username.to_owned(),
            display_name: display_name.to_owned(),
        }
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut directory = UserDirectory::new();
        directory.update([user("alice", "Alice Liddell"), user("bob", " ")]);
        assert_eq!(directory.display_name("alice"), "Alice Liddell");
        assert_eq!(directory.display_name("bob"), "bob");
        assert_eq!(directory.display_name("carol"), "carol");
    }

    #[test]
    fn update_notifies_only_on_change() {
        let seen = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
        let sink = Arc::clone(&seen);
        let mut directory = UserDirectory::new();
        directory.subscribe(move |changed| {
            if let Ok(mut guard) = sink.lock() {
                guard.push(changed.to_vec());
            }
        });

        let first = directory.update([user("alice", "Alice")]);
        let repeat = directory.update([user("alice", "Alice")]);
        let renamed = directory.update([user("alice", "A. Liddell"), user("bob", "Bob")]);

        assert_eq!(first, vec!["alice"]);
        assert!(repeat.is_empty());
        assert_eq!(renamed, vec!["alice", "bob"]);
        let calls = seen.lock().map(|guard| guard.clone()).unwrap_or_default();
        assert_eq!(
            calls,
            vec![
                vec!["alice".to_owned()],
                vec!["alice".to_owned(), "bob".to_owned()]
            ]
        );
    }

    #[test]
    fn missing_skips_cached_and_duplicate_ids() {
        let mut directory = UserDirectory::new();
        directory.update([user("alice", "Alice")]);
        let wanted = vec!["alice".to_owned(), "bob".to_owned(), "bob".to_owned()];
        assert_eq!(directory.missing(&wanted), vec!["bob"]);
        assert_eq!(directory.len(), 1);
    }
}
