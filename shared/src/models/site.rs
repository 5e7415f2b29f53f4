//! Site installation tracking: flats, fixing status and progress reports

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum FixingStatus ("fixing status") {
        Pending => "Pending",
        InProgress => "In Progress",
        OnHold => "On Hold",
        Completed => "Completed",
    }
}

crate::string_enum! {
    pub enum SiteMeasurementStatus ("site measurement status") {
        Pending => "Pending",
        Approved => "Approved",
        Rejected => "Rejected",
    }
}

impl Workflow for SiteMeasurementStatus {
    const ENTITY: &'static str = "site measurement";

    fn allowed_next(&self) -> &'static [Self] {
        use SiteMeasurementStatus::*;
        match self {
            Pending => &[Approved, Rejected],
            Approved | Rejected => &[],
        }
    }
}

crate::string_enum! {
    pub enum SiteIssueStatus ("site issue status") {
        Open => "Open",
        Resolved => "Resolved",
        Closed => "Closed",
    }
}

impl Workflow for SiteIssueStatus {
    const ENTITY: &'static str = "site issue";

    fn allowed_next(&self) -> &'static [Self] {
        use SiteIssueStatus::*;
        match self {
            Open => &[Resolved, Closed],
            Resolved => &[Closed],
            Closed => &[],
        }
    }
}

/// Which doors a flat needs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DoorRequirements {
    #[serde(default)]
    pub main_door: bool,
    #[serde(default)]
    pub bedroom_door: bool,
    #[serde(default)]
    pub bathroom_door: bool,
    #[serde(default)]
    pub kitchen_door: bool,
}

impl DoorRequirements {
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.main_door, "Main Door"),
            (self.bedroom_door, "Bedroom Door"),
            (self.bathroom_door, "Bathroom Door"),
            (self.kitchen_door, "Kitchen Door"),
        ]
        .into_iter()
        .filter_map(|(required, label)| required.then_some(label))
        .collect()
    }
}

/// Required door types not yet covered by a completed door fixing
pub fn pending_doors<'a, I>(required: DoorRequirements, fixed_door_types: I) -> Vec<&'static str>
where
    I: IntoIterator<Item = &'a str>,
{
    let fixed: Vec<String> = fixed_door_types
        .into_iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .collect();
    required
        .labels()
        .into_iter()
        .filter(|label| !fixed.iter().any(|f| f == &label.to_ascii_lowercase()))
        .collect()
}

/// Installation state of a flat from its two fixing flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FixingGap {
    Complete,
    DoorPending,
    FrameMissing,
    NotStarted,
}

impl FixingGap {
    pub fn classify(frame_fixed: bool, door_fixed: bool) -> Self {
        match (frame_fixed, door_fixed) {
            (true, true) => FixingGap::Complete,
            (true, false) => FixingGap::DoorPending,
            (false, true) => FixingGap::FrameMissing,
            (false, false) => FixingGap::NotStarted,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FixingGapCounts {
    pub complete: i64,
    pub door_pending: i64,
    pub frame_missing: i64,
    pub not_started: i64,
}

impl FixingGapCounts {
    pub fn record(&mut self, frame_fixed: bool, door_fixed: bool) {
        match FixingGap::classify(frame_fixed, door_fixed) {
            FixingGap::Complete => self.complete += 1,
            FixingGap::DoorPending => self.door_pending += 1,
            FixingGap::FrameMissing => self.frame_missing += 1,
            FixingGap::NotStarted => self.not_started += 1,
        }
    }
}

/// Share of fixed items in a wing, two decimals
pub fn completion_percent(fixed: i64, total: i64) -> Decimal {
    if total <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(fixed) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixing_gap() {
        let mut counts = FixingGapCounts::default();
        counts.record(true, true);
        counts.record(true, false);
        counts.record(true, false);
        counts.record(false, false);
        assert_eq!(counts.complete, 1);
        assert_eq!(counts.door_pending, 2);
        assert_eq!(counts.frame_missing, 0);
        assert_eq!(counts.not_started, 1);
    }

    #[test]
    fn test_pending_doors() {
        let required = DoorRequirements {
            main_door: true,
            bedroom_door: true,
            bathroom_door: false,
            kitchen_door: true,
        };
        let pending = pending_doors(required, ["main door", "Kitchen Door"]);
        assert_eq!(pending, vec!["Bedroom Door"]);
    }

    #[test]
    fn test_completion_percent() {
        assert_eq!(completion_percent(0, 0), Decimal::ZERO);
        assert_eq!(completion_percent(3, 12), Decimal::from(25));
    }
}
