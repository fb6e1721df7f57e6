//! Pseudo-terminal bridge for hex.
//!
//! Runs a command that insists on a terminal device, collects its streamed
//! output with an idle deadline, and cleans terminal control sequences into
//! plain text.

pub mod capture;
pub mod sanitize;
pub mod session;

pub use capture::{Capture, CaptureEnd};
pub use sanitize::{sanitize, TerminalSanitizer};
pub use session::{run, PtyError, PtyOptions, PtyOutput, PtyProcess};
