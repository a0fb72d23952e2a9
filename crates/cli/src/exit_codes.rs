//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                              |
//! |---------|------------|------------------------------------------|
//! | 0       | Universal  | Success, no findings                     |
//! | 1       | Universal  | General error (unspecified)              |
//! | 2       | Universal  | CLI usage error (bad args, missing file) |
//! | 3-9     | io         | Reading inputs, writing outputs          |
//! | 10-19   | audit      | Audit verdicts                           |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - audit completed and no line was flagged.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// I/O (3-9)
// =============================================================================

/// A file could not be read or written.
pub const EXIT_IO: u8 = 3;

/// The input document is not a valid canonical episode.
pub const EXIT_INPUT_PARSE: u8 = 4;

/// The audit config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 5;

// =============================================================================
// Audit (10-19)
// =============================================================================

/// Audit completed with at least one flagged line.
/// Like `diff(1)` exit 1, this is a verdict, not a failure.
pub const EXIT_AUDIT_FINDINGS: u8 = 10;

/// Audit completed with a systemic pattern across findings.
pub const EXIT_AUDIT_SYSTEMIC: u8 = 11;

/// The adjudication had no lines; the engine rejected the run.
pub const EXIT_AUDIT_REJECTED: u8 = 12;
