//! Vehicle assignment and delivery issue models

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum AssignmentStatus ("vehicle assignment status") {
        Assigned => "assigned",
        InTransit => "in_transit",
        Delayed => "delayed",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
}

impl Workflow for AssignmentStatus {
    const ENTITY: &'static str = "vehicle assignment";

    fn allowed_next(&self) -> &'static [Self] {
        use AssignmentStatus::*;
        match self {
            Assigned => &[InTransit, Delayed, Cancelled],
            InTransit => &[Delayed, Delivered],
            Delayed => &[InTransit, Delivered],
            Delivered | Cancelled => &[],
        }
    }
}

impl AssignmentStatus {
    /// Whether the vehicle goes back to the pool in this status
    pub fn releases_vehicle(&self) -> bool {
        matches!(self, AssignmentStatus::Delivered | AssignmentStatus::Cancelled)
    }
}

crate::string_enum! {
    pub enum DeliveryIssueType ("delivery issue type") {
        DeliveryDelay => "delivery_delay",
        Damage => "damage",
        Shortage => "shortage",
        VehicleBreakdown => "vehicle_breakdown",
        CustomerUnavailable => "customer_unavailable",
        Other => "other",
    }
}

crate::string_enum! {
    pub enum DeliveryIssueStatus ("delivery issue status") {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
    }
}

impl Workflow for DeliveryIssueStatus {
    const ENTITY: &'static str = "delivery issue";

    fn allowed_next(&self) -> &'static [Self] {
        use DeliveryIssueStatus::*;
        match self {
            Open => &[InProgress, Resolved],
            InProgress => &[Resolved],
            Resolved => &[],
        }
    }
}

/// Delivered on or before the expected date. A delivery with no expected
/// date, or no recorded delivery date, is not on time.
pub fn is_on_time(delivered_date: Option<NaiveDate>, expected_delivery_date: Option<NaiveDate>) -> bool {
    match (delivered_date, expected_delivery_date) {
        (Some(delivered), Some(expected)) => delivered <= expected,
        _ => false,
    }
}

/// On-time deliveries as a percentage of all deliveries, two decimals
pub fn on_time_percentage(on_time: i64, delivered: i64) -> Decimal {
    if delivered <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(on_time) * Decimal::ONE_HUNDRED / Decimal::from(delivered)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_time_percentage() {
        assert_eq!(on_time_percentage(0, 0), Decimal::ZERO);
        assert_eq!(on_time_percentage(3, 4), Decimal::from(75));
        assert_eq!(on_time_percentage(2, 3).to_string(), "66.67");
    }

    #[test]
    fn test_on_time_needs_an_expected_date() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        assert!(is_on_time(Some(day(10)), Some(day(10))));
        assert!(is_on_time(Some(day(9)), Some(day(10))));
        assert!(!is_on_time(Some(day(11)), Some(day(10))));
        assert!(!is_on_time(Some(day(10)), None));
        assert!(!is_on_time(None, Some(day(10))));

        let rows = [(Some(day(9)), Some(day(10))), (Some(day(9)), None)];
        let on_time = rows.iter().filter(|(d, e)| is_on_time(*d, *e)).count() as i64;
        assert_eq!(on_time_percentage(on_time, rows.len() as i64), Decimal::from(50));
    }

    #[test]
    fn test_vehicle_release() {
        assert!(AssignmentStatus::Delivered.releases_vehicle());
        assert!(AssignmentStatus::Cancelled.releases_vehicle());
        assert!(!AssignmentStatus::Delayed.releases_vehicle());
    }

    #[test]
    fn test_closed_assignments_are_terminal() {
        assert!(AssignmentStatus::Delivered.is_terminal());
        assert!(AssignmentStatus::Cancelled.is_terminal());
        assert!(!AssignmentStatus::Assigned.is_terminal());
    }
}
