//! Diagnostics.
//!
//! Semantic problems never abort a compilation: they are recorded here (and
//! mirrored to the `log` facade) so that one pass can report many errors.
//! Any error-level record clears the sanity flag; the driver refuses to
//! install insane output.

use boxc_ast::Span;
use core::fmt;

/// Severity of a diagnostic.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Level {
    /// Suspicious but compilable.
    Warning,
    /// The output must not be installed.
    Error,
}

/// One recorded diagnostic.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity.
    pub level: Level,
    /// Source range the message points at.
    pub span: Span,
    /// The rendered message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{}: {} (at {})", level, self.message, self.span)
    }
}

/// The diagnostic sink of one compiler instance.
#[derive(Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    insane: bool,
}

impl Diagnostics {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warn(&mut self, span: Span, message: String) {
        log::warn!("{} (at {})", message, span);
        self.records.push(Diagnostic {
            level: Level::Warning,
            span,
            message,
        });
    }

    /// Record an error and clear the sanity flag.
    pub fn error(&mut self, span: Span, message: String) {
        log::error!("{} (at {})", message, span);
        self.insane = true;
        self.records.push(Diagnostic {
            level: Level::Error,
            span,
            message,
        });
    }

    /// Whether no error has been recorded since the last [`reset`].
    ///
    /// [`reset`]: Diagnostics::reset
    pub fn is_sane(&self) -> bool {
        !self.insane
    }

    /// Restore sanity at the start of a compilation run.
    pub fn reset(&mut self) {
        self.insane = false;
    }

    /// All records, in emission order.
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// The error-level records.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.level == Level::Error)
    }

    /// The warning-level records.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.level == Level::Warning)
    }

    /// Take all records out of the sink.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        core::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_clear_sanity() {
        let mut diags = Diagnostics::new();
        assert!(diags.is_sane());
        diags.warn(Span::NONE, "odd".into());
        assert!(diags.is_sane());
        diags.error(Span::new(3, 5), "bad".into());
        assert!(!diags.is_sane());
        assert_eq!(diags.errors().count(), 1);
        assert_eq!(diags.warnings().count(), 1);
        diags.reset();
        assert!(diags.is_sane());
        assert_eq!(diags.records().len(), 2);
    }
}
