//! The buffer options table.
//!
//! Kept deliberately thin, per the spec: the general option registry is an
//! external collaborator, not part of this core. Only the three recognised
//! keys get validated, typed accessors; anything else is stored and returned
//! verbatim as a string.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Directory used for scratch files during save.
pub const TMP_DIR: &str = "TMP_DIR";
/// Maximum number of actions kept on the undo stack. `"0"` disables undo.
pub const UNDO_LIMIT: &str = "UNDO_LIMIT";
/// Whether the undo log survives a successful save.
pub const UNDO_AFTER_SAVE: &str = "UNDO_AFTER_SAVE";

/// A string-keyed map of buffer options.
#[derive(Debug, Default, Clone)]
pub struct Options {
    values: HashMap<String, String>,
}

impl Options {
    /// Creates the default option set: no `TMP_DIR` override, an undo limit
    /// of 1000 actions, and the undo log preserved across save.
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(UNDO_LIMIT.to_string(), "1000".to_string());
        values.insert(UNDO_AFTER_SAVE.to_string(), "true".to_string());
        Self { values }
    }

    /// Sets a raw string option.
    ///
    /// Recognised keys are validated against their expected shape;
    /// unrecognised keys are accepted without validation, since the full
    /// option registry is not owned by this core.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            UNDO_LIMIT => {
                value
                    .parse::<u64>()
                    .map_err(|_| Error::InvalidArgument(format!("UNDO_LIMIT: {value}")))?;
            }
            UNDO_AFTER_SAVE => {
                value
                    .parse::<bool>()
                    .map_err(|_| Error::InvalidArgument(format!("UNDO_AFTER_SAVE: {value}")))?;
            }
            _ => {}
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Returns a raw string option, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Typed accessor for `TMP_DIR`.
    pub fn tmp_dir(&self) -> Option<&str> {
        self.get(TMP_DIR)
    }

    /// Typed accessor for `UNDO_LIMIT`. Defaults to 1000 if unset or
    /// unparsable (should not happen, since `set` validates it).
    pub fn undo_limit(&self) -> u64 {
        self.get(UNDO_LIMIT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000)
    }

    /// Typed accessor for `UNDO_AFTER_SAVE`. Defaults to `true`.
    pub fn undo_after_save(&self) -> bool {
        self.get(UNDO_AFTER_SAVE)
            .and_then(|v| v.parse().ok())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::new();
        assert_eq!(opts.undo_limit(), 1000);
        assert!(opts.undo_after_save());
        assert_eq!(opts.tmp_dir(), None);
    }

    #[test]
    fn rejects_malformed_recognised_keys() {
        let mut opts = Options::new();
        assert!(opts.set(UNDO_LIMIT, "not-a-number").is_err());
        assert!(opts.set(UNDO_AFTER_SAVE, "maybe").is_err());
    }

    #[test]
    fn accepts_unrecognised_keys_verbatim() {
        let mut opts = Options::new();
        opts.set("SOME_FUTURE_KEY", "42").unwrap();
        assert_eq!(opts.get("SOME_FUTURE_KEY"), Some("42"));
    }

    #[test]
    fn disables_undo_when_zero() {
        let mut opts = Options::new();
        opts.set(UNDO_LIMIT, "0").unwrap();
        assert_eq!(opts.undo_limit(), 0);
    }
}
