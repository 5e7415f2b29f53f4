//! Dispatch, gate pass and delivery tracking models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum DispatchStatus ("dispatch status") {
        Draft => "draft",
        Approved => "approved",
        Dispatched => "dispatched",
        Delayed => "delayed",
        Delivered => "delivered",
    }
}

impl Workflow for DispatchStatus {
    const ENTITY: &'static str = "dispatch";

    fn allowed_next(&self) -> &'static [Self] {
        use DispatchStatus::*;
        match self {
            Draft => &[Approved],
            Approved => &[Dispatched, Delayed],
            Dispatched => &[Delivered, Delayed],
            Delayed => &[Dispatched, Delivered],
            Delivered => &[],
        }
    }
}

impl DispatchStatus {
    /// Dispatch details may be edited until the goods leave
    pub const EDITABLE: &'static [DispatchStatus] = &[DispatchStatus::Draft, DispatchStatus::Approved];

    /// A vehicle can be assigned once the dispatch is approved
    pub const ASSIGNABLE: &'static [DispatchStatus] =
        &[DispatchStatus::Approved, DispatchStatus::Dispatched];

    /// Statuses a dispatch steps through to reach `target`.
    ///
    /// Goods delivered before anyone marked them dispatched still pass
    /// through `dispatched`; every other move is a single step. Empty when
    /// the dispatch is already at `target`.
    pub fn route_to(self, target: DispatchStatus) -> Vec<DispatchStatus> {
        match (self, target) {
            (a, b) if a == b => Vec::new(),
            (DispatchStatus::Approved, DispatchStatus::Delivered) => {
                vec![DispatchStatus::Dispatched, DispatchStatus::Delivered]
            }
            _ => vec![target],
        }
    }
}

/// Dispatch status that mirrors a tracking status
pub fn dispatch_status_for(tracking: TrackingStatus) -> DispatchStatus {
    match tracking {
        TrackingStatus::InTransit => DispatchStatus::Dispatched,
        TrackingStatus::Delayed => DispatchStatus::Delayed,
        TrackingStatus::Delivered => DispatchStatus::Delivered,
    }
}

crate::string_enum! {
    pub enum TrackingStatus ("delivery tracking status") {
        InTransit => "in_transit",
        Delayed => "delayed",
        Delivered => "delivered",
    }
}

impl Workflow for TrackingStatus {
    const ENTITY: &'static str = "delivery tracking";

    fn allowed_next(&self) -> &'static [Self] {
        use TrackingStatus::*;
        match self {
            InTransit => &[Delayed, Delivered],
            Delayed => &[InTransit, Delivered],
            Delivered => &[],
        }
    }
}

/// Line on a dispatch note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchItem {
    pub product_description: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub packing_details: Option<String>,
}

/// Summary printed on the gate pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatePassSummary {
    pub line_count: usize,
    pub total_quantity: Decimal,
    pub descriptions: Vec<String>,
}

pub fn summarize_items(items: &[DispatchItem]) -> GatePassSummary {
    GatePassSummary {
        line_count: items.len(),
        total_quantity: items.iter().map(|i| i.quantity).sum(),
        descriptions: items.iter().map(|i| i.product_description.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ensure_one_of, ensure_transition};

    #[test]
    fn test_dispatch_workflow() {
        use DispatchStatus::*;
        assert!(ensure_transition(Draft, Approved).is_ok());
        assert!(ensure_transition(Draft, Dispatched).is_err());
        assert!(ensure_transition(Approved, Dispatched).is_ok());
        assert!(ensure_transition(Dispatched, Delivered).is_ok());
        assert!(ensure_transition(Delivered, Delayed).is_err());
    }

    #[test]
    fn test_approved_dispatch_delivered_via_dispatched() {
        use DispatchStatus::*;
        let route = Approved.route_to(Delivered);
        assert_eq!(route, vec![Dispatched, Delivered]);

        let mut current = Approved;
        for step in route {
            assert!(ensure_transition(current, step).is_ok(), "{current} -> {step}");
            current = step;
        }
        assert_eq!(Delayed.route_to(Delivered), vec![Delivered]);
        assert_eq!(Approved.route_to(Delayed), vec![Delayed]);
        assert!(Delivered.route_to(Delivered).is_empty());
    }

    #[test]
    fn test_every_tracking_status_is_reachable_from_approved() {
        for tracking in TrackingStatus::ALL {
            let mut current = DispatchStatus::Approved;
            for step in current.route_to(dispatch_status_for(*tracking)) {
                assert!(ensure_transition(current, step).is_ok(), "{current} -> {step}");
                current = step;
            }
            assert_eq!(current, dispatch_status_for(*tracking));
        }
    }

    #[test]
    fn test_editable_until_dispatched() {
        assert!(ensure_one_of(DispatchStatus::Approved, DispatchStatus::EDITABLE).is_ok());
        assert!(ensure_one_of(DispatchStatus::Dispatched, DispatchStatus::EDITABLE).is_err());
    }

    #[test]
    fn test_gate_pass_summary() {
        let items = vec![
            DispatchItem {
                product_description: "Main door shutter".to_string(),
                quantity: Decimal::from(12),
                unit: Some("nos".to_string()),
                packing_details: None,
            },
            DispatchItem {
                product_description: "Bedroom frame".to_string(),
                quantity: Decimal::from(30),
                unit: None,
                packing_details: None,
            },
        ];
        let summary = summarize_items(&items);
        assert_eq!(summary.line_count, 2);
        assert_eq!(summary.total_quantity, Decimal::from(42));
        assert_eq!(summary.descriptions[1], "Bedroom frame");
    }
}
