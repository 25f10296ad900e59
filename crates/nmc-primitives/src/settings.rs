//! Process-wide switches for the name subsystem.

/// Immutable configuration record threaded through the subsystem's
/// constructors.  There is no global mutable state; hosts build this once
/// from their CLI/config layer.
#[derive(Debug, Clone, Copy)]
pub struct NameSettings {
    /// Whether the full per-name history log is maintained.
    pub history: bool,
    /// `-checknamedb` cadence: `-1` disabled, `0` on every flush, `k > 0`
    /// every k-th block (and never on disconnect).
    pub check_name_db: i32,
}

impl Default for NameSettings {
    fn default() -> Self {
        Self {
            history: false,
            check_name_db: -1,
        }
    }
}

impl NameSettings {
    /// Settings with the history log enabled.
    pub fn with_history() -> Self {
        Self {
            history: true,
            ..Self::default()
        }
    }
}
