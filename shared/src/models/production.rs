//! Measurements, production papers, schedules and shop-floor tasks

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum ApprovalStatus ("measurement approval status") {
        PendingApproval => "pending_approval",
        Approved => "approved",
        Rejected => "rejected",
    }
}

impl Workflow for ApprovalStatus {
    const ENTITY: &'static str = "measurement";

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            ApprovalStatus::PendingApproval => &[ApprovalStatus::Approved, ApprovalStatus::Rejected],
            ApprovalStatus::Approved | ApprovalStatus::Rejected => &[],
        }
    }
}

impl ApprovalStatus {
    /// Captains' measurements wait for a production manager; everyone else's are accepted as entered
    pub fn initial_for(created_by_captain: bool) -> Self {
        if created_by_captain {
            ApprovalStatus::PendingApproval
        } else {
            ApprovalStatus::Approved
        }
    }
}

crate::string_enum! {
    pub enum MeasurementTaskStatus ("measurement task status") {
        Assigned => "assigned",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Workflow for MeasurementTaskStatus {
    const ENTITY: &'static str = "measurement task";

    fn allowed_next(&self) -> &'static [Self] {
        use MeasurementTaskStatus::*;
        match self {
            Assigned => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

crate::string_enum! {
    pub enum PaperStatus ("production paper status") {
        Draft => "draft",
        Active => "active",
        InProduction => "in_production",
        ReadyForDispatch => "ready_for_dispatch",
        Dispatched => "dispatched",
        Delivered => "delivered",
        Completed => "completed",
    }
}

impl Workflow for PaperStatus {
    const ENTITY: &'static str = "production paper";

    fn allowed_next(&self) -> &'static [Self] {
        use PaperStatus::*;
        match self {
            Draft => &[Active, InProduction, ReadyForDispatch],
            Active => &[InProduction, ReadyForDispatch],
            InProduction => &[ReadyForDispatch],
            ReadyForDispatch => &[Dispatched],
            Dispatched => &[Delivered],
            Delivered => &[Completed],
            Completed => &[],
        }
    }
}

crate::string_enum! {
    pub enum ScheduleStatus ("production schedule status") {
        Scheduled => "Scheduled",
        InProduction => "In Production",
        OnHold => "On Hold",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

impl Workflow for ScheduleStatus {
    const ENTITY: &'static str = "production schedule";

    fn allowed_next(&self) -> &'static [Self] {
        use ScheduleStatus::*;
        match self {
            Scheduled => &[InProduction, OnHold, Cancelled],
            InProduction => &[Completed, OnHold, Cancelled],
            OnHold => &[InProduction, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

crate::string_enum! {
    pub enum TaskStatus ("production task status") {
        Pending => "Pending",
        Accepted => "Accepted",
        InProgress => "In Progress",
        OnHold => "On Hold",
        Completed => "Completed",
        Rejected => "Rejected",
    }
}

impl Workflow for TaskStatus {
    const ENTITY: &'static str = "production task";

    fn allowed_next(&self) -> &'static [Self] {
        use TaskStatus::*;
        match self {
            Pending => &[Accepted, Rejected],
            Accepted => &[InProgress],
            InProgress => &[OnHold, Completed],
            OnHold => &[InProgress],
            Completed | Rejected => &[],
        }
    }
}

impl TaskStatus {
    /// Statuses in which progress may be reported
    pub const WORKABLE: &'static [TaskStatus] = &[TaskStatus::Accepted, TaskStatus::InProgress];
}

crate::string_enum! {
    pub enum IssueStatus ("production issue status") {
        Open => "Open",
        Assigned => "Assigned",
        InProgress => "In Progress",
        Resolved => "Resolved",
        Closed => "Closed",
    }
}

impl Workflow for IssueStatus {
    const ENTITY: &'static str = "production issue";

    fn allowed_next(&self) -> &'static [Self] {
        use IssueStatus::*;
        match self {
            Open => &[Assigned],
            Assigned => &[InProgress],
            InProgress => &[Resolved],
            Resolved => &[Closed],
            Closed => &[],
        }
    }
}

crate::string_enum! {
    pub enum StageStatus ("tracking stage status") {
        Pending => "Pending",
        InProgress => "In Progress",
        OnHold => "On Hold",
        Completed => "Completed",
    }
}

impl Workflow for StageStatus {
    const ENTITY: &'static str = "production stage";

    fn allowed_next(&self) -> &'static [Self] {
        use StageStatus::*;
        match self {
            Pending => &[InProgress],
            InProgress => &[Completed, OnHold],
            OnHold => &[InProgress],
            Completed => &[],
        }
    }
}

/// One row of a site measurement sheet.
///
/// Unknown columns are kept so sheets from older forms survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementItem {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub width: Option<Decimal>,
    #[serde(default)]
    pub height: Option<Decimal>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_quantity() -> i32 {
    1
}

/// Department slot inside a production schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentSlot {
    pub department_id: Uuid,
    #[serde(default)]
    pub supervisor_type: Option<String>,
    pub planned_start: NaiveDate,
    pub planned_end: NaiveDate,
    pub quantity: i32,
}

impl DepartmentSlot {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.planned_end < self.planned_start {
            return Err("Planned end cannot be before planned start");
        }
        if self.quantity <= 0 {
            return Err("Department quantity must be positive");
        }
        Ok(())
    }
}

/// Whether the new schedule dates differ from the stored ones
pub fn is_reschedule(
    current: (NaiveDate, NaiveDate),
    requested_start: Option<NaiveDate>,
    requested_end: Option<NaiveDate>,
) -> bool {
    requested_start.is_some_and(|d| d != current.0) || requested_end.is_some_and(|d| d != current.1)
}

/// Remaining quantity after reporting `completed` of `quantity`
pub fn task_balance(quantity: i32, completed: i32) -> Result<i32, &'static str> {
    if completed < 0 {
        return Err("Completed quantity cannot be negative");
    }
    if completed > quantity {
        return Err("Completed quantity cannot exceed task quantity");
    }
    Ok(quantity - completed)
}

/// Elapsed hours between two instants, two decimals
pub fn duration_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> Decimal {
    let seconds = (end - start).num_seconds().max(0);
    (Decimal::from(seconds) / Decimal::from(3600)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ensure_transition;
    use chrono::TimeZone;

    #[test]
    fn test_paper_shortcuts() {
        assert!(ensure_transition(PaperStatus::Draft, PaperStatus::InProduction).is_ok());
        assert!(ensure_transition(PaperStatus::Active, PaperStatus::ReadyForDispatch).is_ok());
        assert!(ensure_transition(PaperStatus::Draft, PaperStatus::Dispatched).is_err());
    }

    #[test]
    fn test_quality_approval_readies_any_paper_before_dispatch() {
        for status in [PaperStatus::Draft, PaperStatus::Active, PaperStatus::InProduction] {
            assert!(status.can_transition_to(PaperStatus::ReadyForDispatch), "{status}");
        }
        // and from there the paper can leave the yard
        assert!(PaperStatus::ReadyForDispatch.can_transition_to(PaperStatus::Dispatched));
    }

    #[test]
    fn test_task_pause_resume() {
        assert!(ensure_transition(TaskStatus::InProgress, TaskStatus::OnHold).is_ok());
        assert!(ensure_transition(TaskStatus::OnHold, TaskStatus::InProgress).is_ok());
        assert!(ensure_transition(TaskStatus::OnHold, TaskStatus::Completed).is_err());
        assert!(ensure_transition(TaskStatus::Accepted, TaskStatus::Rejected).is_err());
    }

    #[test]
    fn test_task_balance() {
        assert_eq!(task_balance(20, 5), Ok(15));
        assert_eq!(task_balance(20, 20), Ok(0));
        assert!(task_balance(20, 21).is_err());
        assert!(task_balance(20, -1).is_err());
    }

    #[test]
    fn test_duration_hours() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 11, 30, 0).unwrap();
        assert_eq!(duration_hours(start, end), Decimal::new(250, 2));
        assert_eq!(duration_hours(end, start), Decimal::ZERO);
    }

    #[test]
    fn test_reschedule_detection() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert!(!is_reschedule((start, end), Some(start), None));
        assert!(is_reschedule((start, end), None, Some(start)));
    }

    #[test]
    fn test_measurement_item_keeps_extra_columns() {
        let item: MeasurementItem =
            serde_json::from_str(r#"{"location":"Master bed","width":"910","height":"2100","wall":"brick"}"#)
                .unwrap();
        assert_eq!(item.quantity, 1);
        assert_eq!(item.extra.get("wall").and_then(|v| v.as_str()), Some("brick"));
    }

    #[test]
    fn test_captain_measurements_need_approval() {
        assert_eq!(ApprovalStatus::initial_for(true), ApprovalStatus::PendingApproval);
        assert_eq!(ApprovalStatus::initial_for(false), ApprovalStatus::Approved);
    }
}
