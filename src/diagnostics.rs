// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects problems that shouldn't change the run outcome but should be shown to users.

/// Collects non-fatal warnings during bootstrap operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The run snapshot could not be persisted; resume may start from older state.
    pub fn snapshot_write(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SnapshotWrite, message)
    }

    /// A post-bootstrap or on-error hook failed.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Hook, message)
    }

    /// `down` could not delete every resource.
    pub fn teardown(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Teardown, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    SnapshotWrite,
    Hook,
    Teardown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings_in_order() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::snapshot_write("disk full"));
        diag.warn(Warning::hook("post-bootstrap exited with 3"));

        let kinds: Vec<WarningKind> = diag.warnings().iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::SnapshotWrite, WarningKind::Hook]);
    }
}
