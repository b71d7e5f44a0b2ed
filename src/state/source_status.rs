use serde::{Deserialize, Serialize};

/// Lifecycle status of a data source
///
/// Legal transitions:
///
/// ```text
/// pending → downloading → { completed | failed | partial }
/// failed  → downloading   (manual or periodic retry)
/// partial → downloading | failed
/// completed → downloading (re-download after origin changes)
/// completed → failed      (integrity verification demotion)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Downloading,
    Partial,
    Completed,
    Failed,
}

impl SourceStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloading" => Some(Self::Downloading),
            "partial" => Some(Self::Partial),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Checks whether a transition to `next` is legal
    pub fn can_transition(&self, next: SourceStatus) -> bool {
        use SourceStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Downloading, Partial)
                | (Failed, Downloading)
                | (Partial, Downloading)
                | (Partial, Failed)
                | (Completed, Downloading)
                | (Completed, Failed)
        )
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_roundtrip() {
        for status in [
            SourceStatus::Pending,
            SourceStatus::Downloading,
            SourceStatus::Partial,
            SourceStatus::Completed,
            SourceStatus::Failed,
        ] {
            assert_eq!(
                SourceStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
    }

    #[test]
    fn test_invalid_db_string() {
        assert_eq!(SourceStatus::from_db_string("paused"), None);
    }

    #[test]
    fn test_legal_transitions() {
        assert!(SourceStatus::Pending.can_transition(SourceStatus::Downloading));
        assert!(SourceStatus::Downloading.can_transition(SourceStatus::Completed));
        assert!(SourceStatus::Downloading.can_transition(SourceStatus::Failed));
        assert!(SourceStatus::Downloading.can_transition(SourceStatus::Partial));
        assert!(SourceStatus::Failed.can_transition(SourceStatus::Downloading));
        assert!(SourceStatus::Completed.can_transition(SourceStatus::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!SourceStatus::Pending.can_transition(SourceStatus::Completed));
        assert!(!SourceStatus::Pending.can_transition(SourceStatus::Failed));
        assert!(!SourceStatus::Failed.can_transition(SourceStatus::Completed));
    }
}
