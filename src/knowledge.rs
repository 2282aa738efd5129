//! Append-only knowledge accumulator.
//!
//! Findings only grow within a session and are discarded with it, so the
//! reviewer always evaluates against the full history.

/// The running record of analyzer findings for one session.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    entries: Vec<String>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finding. There is no edit or delete operation.
    pub fn append(&mut self, finding: impl Into<String>) {
        let finding = finding.into();
        if !finding.trim().is_empty() {
            self.entries.push(finding);
        }
    }

    /// Number of findings recorded so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cumulative findings, ready for inclusion in a prompt.
    pub fn snapshot(&self) -> String {
        self.entries.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_grows_monotonically() {
        let mut kb = KnowledgeBase::new();
        assert!(kb.is_empty());

        let mut previous_len = 0;
        for i in 0..10 {
            kb.append(format!("finding {}", i));
            assert!(kb.len() > previous_len);
            previous_len = kb.len();
        }
        assert_eq!(kb.len(), 10);
        assert!(kb.snapshot().contains("finding 0"));
        assert!(kb.snapshot().contains("finding 9"));
    }

    #[test]
    fn test_blank_findings_are_ignored() {
        let mut kb = KnowledgeBase::new();
        kb.append("   ");
        kb.append("");
        assert!(kb.is_empty());
        kb.append("real finding");
        assert_eq!(kb.len(), 1);
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let mut kb = KnowledgeBase::new();
        kb.append("first");
        kb.append("second");
        let snapshot = kb.snapshot();
        let first = snapshot.find("first").unwrap();
        let second = snapshot.find("second").unwrap();
        assert!(first < second);
    }
}
