//! Ordered API key pool with a monotonically advancing cursor

use crate::core::models::KeyInfo;

/// Cursor over an ordered list of API keys for one provider.
///
/// The cursor only moves forward during a translation run; it resets to the
/// first key when the key list is replaced (the user edited their settings).
/// Exhaustion (`cursor == keys.len()`) is a terminal condition the scheduler
/// converts into a job failure; the pool itself never retries anything.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: usize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys, cursor: 0 }
    }

    /// Replace the key list and reset the cursor
    pub fn initialize(&mut self, keys: Vec<String>) {
        self.keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self.cursor = 0;
    }

    /// The key at the cursor, or `None` when the pool is exhausted
    pub fn current(&self) -> Option<&str> {
        self.keys.get(self.cursor).map(String::as_str)
    }

    /// Move past the current key; returns whether any key remains
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.keys.len() {
            self.cursor += 1;
        }
        self.cursor < self.keys.len()
    }

    /// Position for UI and notifications
    pub fn describe(&self) -> KeyInfo {
        if self.keys.is_empty() || self.cursor >= self.keys.len() {
            return KeyInfo {
                total: self.keys.len(),
                current: 0,
            };
        }
        KeyInfo {
            total: self.keys.len(),
            current: self.cursor + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Redact a key for log output
pub fn mask_key(key: &str) -> String {
    // counted in chars, not bytes; keys are user input and may be non-ASCII
    let count = key.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let head: String = key.chars().take(4).collect();
    let tail: String = key.chars().skip(count - 4).collect();
    format!("{}...{}", head, tail)
}
