//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `check` - Config loading, `check` and `detect`
//! - `rules` - Keyword rule listing and testing
//! - `run` - The import → categorize → deliver run over an input directory

pub mod check;
pub mod rules;
pub mod run;

// Re-export command functions for main.rs
pub use check::*;
pub use rules::*;
pub use run::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
