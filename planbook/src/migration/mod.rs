/// The outcome of comparing a stored payload's schema version with the
/// version this client writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// Stored version matches; decode as-is.
    Current,
    /// Stored rows predate the current template and are regenerated.
    Regenerate { from: u32, to: u32 },
    /// Written by a newer client; decoded as-is.
    Ahead { stored: u32, current: u32 },
}

impl Migration {
    /// Whether applying this migration discards stored row values.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Migration::Regenerate { .. })
    }

    /// Human-readable description of this migration.
    pub fn describe(&self) -> String {
        match self {
            Migration::Current => "Schema is current".to_string(),
            Migration::Regenerate { from, to } => format!(
                "Schema version {from} -> {to}: rows regenerated from template (stored values discarded)"
            ),
            Migration::Ahead { stored, current } => format!(
                "Schema version {stored} is newer than supported version {current} (WARNING)"
            ),
        }
    }
}

/// Decide what to do with a payload stored at `stored` when this client is
/// at `current`.
pub fn plan(stored: u32, current: u32) -> Migration {
    if stored < current {
        Migration::Regenerate {
            from: stored,
            to: current,
        }
    } else if stored > current {
        Migration::Ahead { stored, current }
    } else {
        Migration::Current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_current() {
        assert_eq!(plan(2, 2), Migration::Current);
        assert!(!plan(2, 2).is_destructive());
        assert_eq!(plan(0, 0), Migration::Current);
    }

    #[test]
    fn test_plan_older_regenerates() {
        let m = plan(1, 2);
        assert_eq!(m, Migration::Regenerate { from: 1, to: 2 });
        assert!(m.is_destructive());
        assert!(m.describe().contains("1 -> 2"));
    }

    #[test]
    fn test_plan_missing_version_regenerates() {
        assert!(plan(0, 2).is_destructive());
    }

    #[test]
    fn test_plan_newer_is_kept() {
        let m = plan(3, 2);
        assert_eq!(m, Migration::Ahead { stored: 3, current: 2 });
        assert!(!m.is_destructive());
        assert!(m.describe().contains("WARNING"));
    }
}
