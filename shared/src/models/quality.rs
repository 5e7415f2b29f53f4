//! Quality checks, rework jobs and certificates

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum QcStatus ("quality check status") {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        ReworkRequired => "rework_required",
    }
}

impl Workflow for QcStatus {
    const ENTITY: &'static str = "quality check";

    fn allowed_next(&self) -> &'static [Self] {
        use QcStatus::*;
        match self {
            Pending => &[Approved, Rejected, ReworkRequired],
            ReworkRequired => &[Pending, Approved, Rejected],
            Approved | Rejected => &[],
        }
    }
}

crate::string_enum! {
    pub enum ReworkStatus ("rework job status") {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

impl Workflow for ReworkStatus {
    const ENTITY: &'static str = "rework job";

    fn allowed_next(&self) -> &'static [Self] {
        use ReworkStatus::*;
        match self {
            Pending => &[InProgress, Completed],
            InProgress => &[Completed],
            Completed => &[],
        }
    }
}

crate::string_enum! {
    pub enum DefectSeverity ("defect severity") {
        Minor => "minor",
        Major => "major",
        Critical => "critical",
    }
}

/// Single checklist entry recorded by the inspector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistItem {
    pub parameter: String,
    pub passed: bool,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Inspected, passed and failed counts on a quality check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InspectionQuantities {
    pub inspected: i32,
    pub passed: i32,
    pub failed: i32,
}

impl InspectionQuantities {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.inspected < 0 || self.passed < 0 || self.failed < 0 {
            return Err("Quantities cannot be negative");
        }
        if self.passed + self.failed > self.inspected {
            return Err("Passed and failed quantities exceed inspected quantity");
        }
        Ok(())
    }
}

/// Approved checks over decided checks, in percent
pub fn pass_rate(approved: i64, rejected: i64) -> Decimal {
    let decided = approved + rejected;
    if decided <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(approved) * Decimal::ONE_HUNDRED / Decimal::from(decided)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ensure_transition;

    #[test]
    fn test_rework_cycle() {
        assert!(ensure_transition(QcStatus::Pending, QcStatus::ReworkRequired).is_ok());
        assert!(ensure_transition(QcStatus::ReworkRequired, QcStatus::Pending).is_ok());
        assert!(ensure_transition(QcStatus::Approved, QcStatus::Pending).is_err());
    }

    #[test]
    fn test_inspection_quantities() {
        let ok = InspectionQuantities { inspected: 10, passed: 8, failed: 2 };
        assert!(ok.validate().is_ok());
        let too_many = InspectionQuantities { inspected: 10, passed: 9, failed: 2 };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_pass_rate() {
        assert_eq!(pass_rate(0, 0), Decimal::ZERO);
        assert_eq!(pass_rate(9, 1), Decimal::from(90));
    }
}
