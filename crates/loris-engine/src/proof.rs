use std::fmt::Write as _;

use loris_ir::ItsProblem;

/// Write-only sink for the human-readable proof. The driver appends to it
/// at every simplification step; the CLI decides whether it is printed.
#[derive(Debug, Clone, Default)]
pub struct ProofLog {
    enabled: bool,
    buf: String,
}

impl ProofLog {
    pub fn new(enabled: bool) -> Self {
        ProofLog {
            enabled,
            buf: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn section(&mut self, title: &str) {
        if self.enabled {
            let _ = writeln!(self.buf, "\n### {title} ###\n");
        }
    }

    pub fn headline(&mut self, text: &str) {
        if self.enabled {
            let _ = writeln!(self.buf, "\n{text}");
        }
    }

    pub fn line(&mut self, text: &str) {
        if self.enabled {
            let _ = writeln!(self.buf, "{text}");
        }
    }

    pub fn warning(&mut self, text: &str) {
        if self.enabled {
            let _ = writeln!(self.buf, "WARNING: {text}");
        }
    }

    /// Appends the current problem, indented, as proof context.
    pub fn problem(&mut self, its: &ItsProblem) {
        if !self.enabled {
            return;
        }
        for line in its.to_string().lines() {
            let _ = writeln!(self.buf, "  {line}");
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_stays_empty() {
        let mut log = ProofLog::new(false);
        log.section("Preprocessing");
        log.line("something");
        assert!(log.as_str().is_empty());
    }

    #[test]
    fn enabled_log_collects_lines() {
        let mut log = ProofLog::new(true);
        log.section("Preprocessing");
        log.headline("Simplified all rules");
        log.line("detail");
        log.warning("partial result");
        let text = log.as_str();
        assert!(text.contains("### Preprocessing ###"));
        assert!(text.contains("Simplified all rules"));
        assert!(text.contains("WARNING: partial result"));
    }
}
