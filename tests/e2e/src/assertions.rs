//! Assertion helpers for end-to-end scenarios.
//!
//! These are pure functions over state collected from clients and from the
//! relay's storage directory. They return pass/fail with details instead of
//! panicking, so a scenario can report every failed check at once.

use std::collections::BTreeMap;
use std::path::Path;

/// What one client reads for a set of paths.
#[derive(Debug, Clone, Default)]
pub struct ClientView {
    /// Client name, for failure messages.
    pub name: String,
    /// Path or URL -> content read (`None` when missing or deleted).
    pub entries: BTreeMap<String, Option<Vec<u8>>>,
}

impl ClientView {
    /// An empty view for `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Record what was read at `path`.
    pub fn insert(&mut self, path: &str, value: Option<Vec<u8>>) {
        self.entries.insert(path.into(), value);
    }
}

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// Assert that every client read exactly `expected` at `path`.
pub fn assert_entry(views: &[ClientView], path: &str, expected: Option<&[u8]>) -> AssertionResult {
    for view in views {
        let actual = view.entries.get(path).and_then(|v| v.as_deref());
        if actual != expected {
            return AssertionResult::fail(
                &format!("Entry {path}"),
                &format!(
                    "Client {} read {:?}, expected {:?}",
                    view.name,
                    actual.map(String::from_utf8_lossy),
                    expected.map(String::from_utf8_lossy)
                ),
            );
        }
    }

    AssertionResult::pass(&format!("All {} clients agree on {path}", views.len()))
}

/// Assert that all clients read the same thing for every path any of them
/// read.
pub fn assert_converged(views: &[ClientView]) -> AssertionResult {
    let Some(reference) = views.first() else {
        return AssertionResult::pass("No clients to check");
    };

    for view in &views[1..] {
        if view.entries != reference.entries {
            let differing: Vec<&String> = reference
                .entries
                .keys()
                .chain(view.entries.keys())
                .filter(|path| reference.entries.get(*path) != view.entries.get(*path))
                .collect();
            return AssertionResult::fail(
                "Convergence",
                &format!(
                    "Client {} differs from client {} at {:?}",
                    view.name, reference.name, differing
                ),
            );
        }
    }

    AssertionResult::pass(&format!("All {} clients converged", views.len()))
}

/// Assert that no file under `dir` contains `plaintext`.
///
/// Used on the relay's storage directory after publishing encrypted
/// entries.
pub fn assert_no_plaintext_on_disk(dir: &Path, plaintext: &[u8]) -> AssertionResult {
    if plaintext.is_empty() {
        return AssertionResult::pass("Empty plaintext");
    }

    let mut pending = vec![dir.to_path_buf()];
    let mut scanned = 0usize;
    while let Some(path) = pending.pop() {
        let entries = match std::fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                return AssertionResult::fail(
                    "No plaintext on disk",
                    &format!("Cannot read {}: {e}", path.display()),
                )
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            scanned += 1;
            if bytes.windows(plaintext.len()).any(|w| w == plaintext) {
                return AssertionResult::fail(
                    "No plaintext on disk",
                    &format!("Found plaintext in {}", path.display()),
                );
            }
        }
    }

    AssertionResult::pass(&format!("Scanned {scanned} files, no plaintext found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(name: &str, entries: &[(&str, Option<&[u8]>)]) -> ClientView {
        let mut view = ClientView::new(name);
        for (path, value) in entries {
            view.insert(path, value.map(<[u8]>::to_vec));
        }
        view
    }

    #[test]
    fn entry_passes_when_all_agree() {
        let views = vec![
            view("a", &[("/foo", Some(&b"bar"[..]))]),
            view("b", &[("/foo", Some(&b"bar"[..]))]),
        ];
        assert!(assert_entry(&views, "/foo", Some(&b"bar"[..])).passed);
    }

    #[test]
    fn entry_fails_on_mismatch() {
        let views = vec![
            view("a", &[("/foo", Some(&b"bar"[..]))]),
            view("b", &[("/foo", None)]),
        ];
        let result = assert_entry(&views, "/foo", Some(&b"bar"[..]));
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("Client b"));
    }

    #[test]
    fn converged_detects_divergence() {
        let views = vec![
            view("a", &[("/x", Some(&b"1"[..])), ("/y", None)]),
            view("b", &[("/x", Some(&b"2"[..])), ("/y", None)]),
        ];
        let result = assert_converged(&views);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("/x"));
    }

    #[test]
    fn converged_with_no_clients() {
        assert!(assert_converged(&[]).passed);
    }

    #[test]
    fn plaintext_scan_finds_leak() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("content")).unwrap();
        std::fs::write(dir.path().join("content/abc"), b"xx secret xx").unwrap();

        assert!(!assert_no_plaintext_on_disk(dir.path(), b"secret").passed);
        assert!(assert_no_plaintext_on_disk(dir.path(), b"other").passed);
    }
}
