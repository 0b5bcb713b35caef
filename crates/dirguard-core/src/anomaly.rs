//! Permission anomaly detection.
//!
//! An entry is anomalous only when every one of its nine permission bits is
//! cleared. Partial removals (e.g. no execute bit) are never flagged.

use std::path::PathBuf;

use crate::metadata::{AccessMask, MetadataRecord};

pub fn is_anomalous(access: AccessMask) -> bool {
    access.is_empty()
}

/// What happened to an anomalous entry once its analysis finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Analyzer returned zero; entry stays in place with no rights.
    Safe,
    /// Classified unsafe and moved into the quarantine directory.
    Quarantined(PathBuf),
    /// Classified unsafe but the move failed; entry stays in place.
    QuarantineFailed,
    /// The analysis could not be started.
    Unanalyzed,
}

impl Disposition {
    pub fn is_unsafe(&self) -> bool {
        matches!(self, Disposition::Quarantined(_) | Disposition::QuarantineFailed)
    }

    pub fn relocated(&self) -> bool {
        matches!(self, Disposition::Quarantined(_))
    }
}

/// Receives anomalous entries from the walker.
///
/// Called synchronously: the walker does not append the entry's record until
/// this returns.
pub trait AnomalyHandler {
    fn on_anomaly(&mut self, record: &MetadataRecord) -> Disposition;
}

/// Runs the detector for one record and forwards it to `handler` on a match.
pub fn check_entry(record: &MetadataRecord, handler: &mut dyn AnomalyHandler) -> Option<Disposition> {
    if is_anomalous(record.access) {
        Some(handler.on_anomaly(record))
    } else {
        None
    }
}
