//! ANSI escape stripping for captured output.

use vte::{Parser, Perform};

/// Removes terminal control sequences from text.
///
/// PowerShell 7 and many CLI tools colorize output even when writing to a
/// pipe; this recovers the plain text.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip escape sequences from raw bytes.
    ///
    /// CSI, OSC, DCS and plain ESC sequences are dropped, as are control
    /// characters other than newline, carriage return and tab.
    pub fn strip_ansi(input: &[u8]) -> String {
        let mut text = PlainText(String::with_capacity(input.len()));
        Parser::new().advance(&mut text, input);
        text.0
    }

    /// Strip escape sequences from captured text.
    ///
    /// Text without an ESC byte is returned unchanged.
    pub fn strip_ansi_str(input: &str) -> String {
        if Self::has_escapes(input) {
            Self::strip_ansi(input.as_bytes())
        } else {
            input.to_string()
        }
    }

    /// Whether the text contains any escape introducer.
    pub fn has_escapes(input: &str) -> bool {
        input.contains('\x1b')
    }
}

/// Collects printable characters, ignoring every dispatched sequence.
struct PlainText(String);

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        self.0.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.0.push(char::from(byte));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(OutputSanitizer::strip_ansi_str("hello world\n"), "hello world\n");
    }

    #[test]
    fn test_strip_sgr() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31mred\x1b[0m"), "red");
        assert_eq!(
            OutputSanitizer::strip_ansi(b"\x1b[32m\x1b[1mok\x1b[0m done"),
            "ok done"
        );
    }

    #[test]
    fn test_strip_osc_title() {
        assert_eq!(
            OutputSanitizer::strip_ansi(b"\x1b]0;pwsh\x07PS> Get-Date"),
            "PS> Get-Date"
        );
    }

    #[test]
    fn test_keeps_line_structure() {
        assert_eq!(
            OutputSanitizer::strip_ansi(b"a\tb\r\n\x1b[2Kc\x08"),
            "a\tb\r\nc"
        );
    }

    #[test]
    fn test_multibyte_survives() {
        assert_eq!(OutputSanitizer::strip_ansi_str("\x1b[1m日本\x1b[0m"), "日本");
    }

    #[test]
    fn test_only_escapes() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31m\x1b[0m\x1b[2J"), "");
        assert!(!OutputSanitizer::has_escapes("plain"));
    }
}
