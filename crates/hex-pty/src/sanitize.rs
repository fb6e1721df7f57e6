//! Terminal output sanitizing.
//!
//! Strips escape sequences and stray control bytes from text captured off a
//! pseudo-terminal so it can be stored as plain text and echoed to the
//! operator's terminal without side effects.

use regex::Regex;
use std::sync::OnceLock;

/// Escape sequence patterns, applied in order.
const ESCAPE_PATTERNS: &[&str] = &[
    // OSC: ESC ] ... terminated by BEL or ST
    r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
    // DCS, SOS, PM, APC: ESC P/X/^/_ ... ST
    r"(?s)\x1b[PX^_].*?(?:\x1b\\|\x07)",
    // CSI: ESC [ params intermediates final
    r"\x1b\[[0-?]*[ -/]*[@-~]",
    // Two-byte and charset-designation escapes (ESC ( B, ESC =, ESC 7, ...)
    r"\x1b[ -/]*[0-~]",
];

/// Line endings as the pty delivers them (`\r\n`) or bare carriage returns.
const CARRIAGE_RETURN: &str = r"\r\n?";

/// C0 controls except tab/newline, DEL, and C1 controls.
const CONTROL_BYTES: &str = r"[\x00-\x08\x0b-\x1f\x7f\x{80}-\x{9f}]";

/// Leftover from the model CLI's keyboard-protocol probe once its ESC is gone.
const GARBAGE_TOKEN: &str = r"\[<u";

/// Compiled sanitizer. Cleaning is idempotent: running `clean` on its own
/// output returns the same string.
pub struct TerminalSanitizer {
    escapes: Vec<Regex>,
    carriage_return: Option<Regex>,
    control: Option<Regex>,
    garbage: Option<Regex>,
}

impl TerminalSanitizer {
    pub fn new() -> Self {
        Self {
            escapes: ESCAPE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            carriage_return: Regex::new(CARRIAGE_RETURN).ok(),
            control: Regex::new(CONTROL_BYTES).ok(),
            garbage: Regex::new(GARBAGE_TOKEN).ok(),
        }
    }

    /// Remove escape sequences, control bytes and the known garbage token,
    /// normalize line endings, and trim surrounding whitespace.
    pub fn clean(&self, raw: &str) -> String {
        let mut text = raw.to_string();

        for pattern in &self.escapes {
            if pattern.is_match(&text) {
                text = pattern.replace_all(&text, "").into_owned();
            }
        }

        if let Some(cr) = &self.carriage_return {
            text = cr.replace_all(&text, "\n").into_owned();
        }

        // Must run after the escape patterns: it also removes any lone ESC.
        if let Some(control) = &self.control {
            text = control.replace_all(&text, "").into_owned();
        }

        // Removing one token can splice a new one together ("[<[<uu").
        if let Some(garbage) = &self.garbage {
            while garbage.is_match(&text) {
                text = garbage.replace_all(&text, "").into_owned();
            }
        }

        text.trim().to_string()
    }
}

impl Default for TerminalSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clean text with a process-wide sanitizer.
pub fn sanitize(raw: &str) -> String {
    static SANITIZER: OnceLock<TerminalSanitizer> = OnceLock::new();
    SANITIZER.get_or_init(TerminalSanitizer::new).clean(raw)
}
