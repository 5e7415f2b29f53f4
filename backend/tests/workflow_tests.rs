//! Status workflow and role tests
//!
//! Property and unit tests for:
//! - Transition checks agree with each workflow's table
//! - Each table accepts exactly the documented edges and nothing else
//! - Stored status strings parse back to the same status
//! - Document lifecycles only move forward
//! - Role groups always admit admin

use std::fmt::Debug;
use std::str::FromStr;

use proptest::prelude::*;
use shared::{
    ensure_one_of, ensure_transition, parse_status, ApprovalStatus, AssignmentStatus,
    BillingRequestStatus, ChallanStatus, DeliveryIssueStatus, DispatchStatus, GrnStatus,
    InvoiceStatus, IssueStatus, LeadStatus, MeasurementRequestStatus, MeasurementTaskStatus,
    PaperStatus, PartyApprovalStatus, PurchaseOrderStatus, QcStatus, QuotationStatus,
    ReceiptStatus, ReconciliationStatus, RequisitionStatus, ReworkStatus, Role, RoleGroup,
    SalesOrderStatus, ScheduleStatus, SiteIssueStatus, SiteMeasurementStatus, StageStatus,
    TaskStatus, TrackingStatus, TransitionError, UnknownVariant, VendorBillStatus, Workflow,
};

/// Checks one workflow table against the guard functions
fn assert_table_consistent<W>(all: &[W])
where
    W: Workflow + Debug + FromStr<Err = UnknownVariant>,
{
    for &from in all {
        for &next in from.allowed_next() {
            assert!(all.contains(&next), "{from} lists unknown successor {next}");
        }
        for &to in all {
            let allowed = from.allowed_next().contains(&to);
            assert_eq!(ensure_transition(from, to).is_ok(), allowed, "{from} -> {to}");
        }
        assert_eq!(parse_status::<W>(&from.to_string()), Ok(from));
        assert_eq!(from.is_terminal(), from.allowed_next().is_empty());
    }
}

/// The guard accepts exactly `edges` and rejects every other pair
fn assert_exact_edges<W: Workflow + Debug>(all: &[W], edges: &[(W, W)]) {
    for &from in all {
        for &to in all {
            let listed = edges.contains(&(from, to));
            assert_eq!(
                ensure_transition(from, to).is_ok(),
                listed,
                "{from} -> {to} should be {}",
                if listed { "allowed" } else { "rejected" }
            );
        }
    }
}

/// Every transition moves to a status declared later than the current one
fn assert_forward_only<W: Workflow + Debug>(all: &[W]) {
    let rank = |s: W| all.iter().position(|x| *x == s).unwrap();
    for &from in all {
        for &to in from.allowed_next() {
            assert!(rank(to) > rank(from), "{from} -> {to} moves backwards");
        }
    }
}

/// Follows `choices` through the workflow starting at `start`
fn walk<W: Workflow>(start: W, choices: &[usize]) -> Vec<W> {
    let mut path = vec![start];
    let mut current = start;
    for choice in choices {
        let next = current.allowed_next();
        if next.is_empty() {
            break;
        }
        current = next[choice % next.len()];
        path.push(current);
    }
    path
}

// ============================================================================
// Transition Table Tests
// ============================================================================

mod transition_tables {
    use super::*;

    #[test]
    fn sales_workflows() {
        assert_table_consistent(LeadStatus::ALL);
        assert_table_consistent(QuotationStatus::ALL);
        assert_table_consistent(SalesOrderStatus::ALL);
    }

    #[test]
    fn production_workflows() {
        assert_table_consistent(PaperStatus::ALL);
        assert_table_consistent(ScheduleStatus::ALL);
        assert_table_consistent(TaskStatus::ALL);
        assert_table_consistent(QcStatus::ALL);
    }

    #[test]
    fn billing_and_dispatch_workflows() {
        assert_table_consistent(BillingRequestStatus::ALL);
        assert_table_consistent(ChallanStatus::ALL);
        assert_table_consistent(InvoiceStatus::ALL);
        assert_table_consistent(DispatchStatus::ALL);
        assert_table_consistent(TrackingStatus::ALL);
        assert_table_consistent(ReceiptStatus::ALL);
    }

    #[test]
    fn purchase_workflows() {
        assert_table_consistent(RequisitionStatus::ALL);
        assert_table_consistent(PurchaseOrderStatus::ALL);
        assert_table_consistent(GrnStatus::ALL);
        assert_table_consistent(VendorBillStatus::ALL);
    }

    #[test]
    fn document_lifecycles_move_forward() {
        assert_forward_only(PaperStatus::ALL);
        assert_forward_only(BillingRequestStatus::ALL);
        assert_forward_only(ChallanStatus::ALL);
        assert_forward_only(RequisitionStatus::ALL);
        assert_forward_only(GrnStatus::ALL);
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!(matches!(
            parse_status::<PaperStatus>("shipped"),
            Err(TransitionError::Unknown(_))
        ));
        assert!(parse_status::<PurchaseOrderStatus>("Sent to Vendor").is_ok());
    }

    #[test]
    fn unexpected_status_names_the_options() {
        let err = ensure_one_of(PurchaseOrderStatus::Draft, PurchaseOrderStatus::RECEIVABLE)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Draft"));
        assert!(err.contains("Partially Received"));
    }
}

// ============================================================================
// Documented Edge Lists
// ============================================================================

mod documented_edges {
    use super::*;

    #[test]
    fn billing_request() {
        use BillingRequestStatus::*;
        assert_exact_edges(
            BillingRequestStatus::ALL,
            &[
                (Pending, DcCreated),
                (DcCreated, InvoiceCreated),
                (InvoiceCreated, BillingApproved),
                (BillingApproved, SentToDispatch),
            ],
        );
    }

    #[test]
    fn delivery_challan_and_invoice() {
        {
            use ChallanStatus::*;
            assert_exact_edges(ChallanStatus::ALL, &[(Draft, Approved), (Approved, SentToDispatch)]);
        }
        {
            use InvoiceStatus::*;
            assert_exact_edges(InvoiceStatus::ALL, &[(Draft, Approved), (Approved, SentToDispatch)]);
        }
    }

    #[test]
    fn dispatch() {
        use DispatchStatus::*;
        assert_exact_edges(
            DispatchStatus::ALL,
            &[
                (Draft, Approved),
                (Approved, Dispatched),
                (Dispatched, Delivered),
                (Approved, Delayed),
                (Dispatched, Delayed),
                (Delayed, Dispatched),
                (Delayed, Delivered),
            ],
        );
    }

    #[test]
    fn delivery_tracking() {
        use TrackingStatus::*;
        assert_exact_edges(
            TrackingStatus::ALL,
            &[
                (InTransit, Delayed),
                (Delayed, InTransit),
                (InTransit, Delivered),
                (Delayed, Delivered),
            ],
        );
    }

    #[test]
    fn vehicle_assignment() {
        use AssignmentStatus::*;
        assert_exact_edges(
            AssignmentStatus::ALL,
            &[
                (Assigned, InTransit),
                (InTransit, Delivered),
                (Assigned, Delayed),
                (InTransit, Delayed),
                (Delayed, InTransit),
                (Delayed, Delivered),
                (Assigned, Cancelled),
            ],
        );
        // Vehicle and driver swaps are refused on these
        let closed: Vec<_> = AssignmentStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(closed, vec![&Delivered, &Cancelled]);
    }

    #[test]
    fn payment_receipt_and_reconciliation() {
        {
            use ReceiptStatus::*;
            assert_exact_edges(
                ReceiptStatus::ALL,
                &[
                    (Pending, Received),
                    (Received, Cleared),
                    (Pending, Bounced),
                    (Received, Bounced),
                ],
            );
        }
        {
            use ReconciliationStatus::*;
            assert_exact_edges(ReconciliationStatus::ALL, &[(Draft, Approved)]);
        }
    }

    #[test]
    fn purchase_documents() {
        {
            use RequisitionStatus::*;
            assert_exact_edges(
                RequisitionStatus::ALL,
                &[
                    (Draft, Submitted),
                    (Submitted, Approved),
                    (Approved, ConvertedToPo),
                    (Submitted, Rejected),
                ],
            );
        }
        {
            use PurchaseOrderStatus::*;
            assert_exact_edges(
                PurchaseOrderStatus::ALL,
                &[
                    (Draft, Approved),
                    (Approved, SentToVendor),
                    (SentToVendor, PartiallyReceived),
                    (PartiallyReceived, Closed),
                    (SentToVendor, Closed),
                    (Approved, PartiallyReceived),
                    (Approved, Closed),
                ],
            );
        }
        {
            use GrnStatus::*;
            assert_exact_edges(GrnStatus::ALL, &[(Draft, Approved), (Draft, Rejected)]);
        }
        {
            use VendorBillStatus::*;
            assert_exact_edges(
                VendorBillStatus::ALL,
                &[(Pending, Approved), (Approved, Paid), (Pending, Rejected)],
            );
        }
    }

    #[test]
    fn quality_check_and_rework() {
        {
            use QcStatus::*;
            assert_exact_edges(
                QcStatus::ALL,
                &[
                    (Pending, Approved),
                    (Pending, Rejected),
                    (Pending, ReworkRequired),
                    (ReworkRequired, Pending),
                    (ReworkRequired, Approved),
                    (ReworkRequired, Rejected),
                ],
            );
        }
        {
            use ReworkStatus::*;
            assert_exact_edges(
                ReworkStatus::ALL,
                &[(Pending, InProgress), (InProgress, Completed), (Pending, Completed)],
            );
        }
    }

    #[test]
    fn production_paper() {
        use PaperStatus::*;
        assert_exact_edges(
            PaperStatus::ALL,
            &[
                (Draft, Active),
                (Active, InProduction),
                (InProduction, ReadyForDispatch),
                (ReadyForDispatch, Dispatched),
                (Dispatched, Delivered),
                (Delivered, Completed),
                (Draft, InProduction),
                (Active, ReadyForDispatch),
                (Draft, ReadyForDispatch),
            ],
        );
    }

    #[test]
    fn production_task_and_schedule() {
        {
            use TaskStatus::*;
            assert_exact_edges(
                TaskStatus::ALL,
                &[
                    (Pending, Accepted),
                    (Accepted, InProgress),
                    (InProgress, OnHold),
                    (OnHold, InProgress),
                    (InProgress, Completed),
                    (Pending, Rejected),
                ],
            );
        }
        {
            use ScheduleStatus::*;
            assert_exact_edges(
                ScheduleStatus::ALL,
                &[
                    (Scheduled, InProduction),
                    (InProduction, Completed),
                    (Scheduled, OnHold),
                    (InProduction, OnHold),
                    (OnHold, InProduction),
                    (Scheduled, Cancelled),
                    (InProduction, Cancelled),
                    (OnHold, Cancelled),
                ],
            );
        }
    }

    #[test]
    fn production_floor() {
        {
            use IssueStatus::*;
            assert_exact_edges(
                IssueStatus::ALL,
                &[
                    (Open, Assigned),
                    (Assigned, InProgress),
                    (InProgress, Resolved),
                    (Resolved, Closed),
                ],
            );
        }
        {
            use StageStatus::*;
            assert_exact_edges(
                StageStatus::ALL,
                &[
                    (Pending, InProgress),
                    (InProgress, Completed),
                    (InProgress, OnHold),
                    (OnHold, InProgress),
                ],
            );
        }
        {
            use MeasurementTaskStatus::*;
            assert_exact_edges(
                MeasurementTaskStatus::ALL,
                &[
                    (Assigned, InProgress),
                    (InProgress, Completed),
                    (Assigned, Cancelled),
                    (InProgress, Cancelled),
                ],
            );
        }
    }

    #[test]
    fn sales_documents() {
        {
            use SalesOrderStatus::*;
            assert_exact_edges(
                SalesOrderStatus::ALL,
                &[
                    (Confirmed, MeasurementPending),
                    (MeasurementPending, InProduction),
                    (InProduction, ReadyForDispatch),
                    (ReadyForDispatch, Dispatched),
                    (Dispatched, Delivered),
                ],
            );
        }
        {
            use QuotationStatus::*;
            assert_exact_edges(
                QuotationStatus::ALL,
                &[
                    (Draft, Sent),
                    (Sent, Accepted),
                    (Sent, Rejected),
                    (Sent, Expired),
                ],
            );
        }
    }

    #[test]
    fn lead() {
        use LeadStatus::*;
        assert_exact_edges(
            LeadStatus::ALL,
            &[
                (New, Contacted),
                (Contacted, Qualified),
                (Qualified, QuotationSent),
                (QuotationSent, Won),
                (QuotationSent, Lost),
                (New, Lost),
                (Contacted, Lost),
                (Qualified, Lost),
                (New, Won),
                (Contacted, Won),
                (Qualified, Won),
            ],
        );
    }

    #[test]
    fn measurement_request() {
        use MeasurementRequestStatus::*;
        assert_exact_edges(
            MeasurementRequestStatus::ALL,
            &[
                (Pending, Assigned),
                (Assigned, Scheduled),
                (Scheduled, Completed),
                (Pending, Cancelled),
                (Assigned, Cancelled),
                (Scheduled, Cancelled),
            ],
        );
    }

    #[test]
    fn approvals() {
        {
            use PartyApprovalStatus::*;
            assert_exact_edges(
                PartyApprovalStatus::ALL,
                &[(Draft, PendingApproval), (PendingApproval, Approved)],
            );
        }
        {
            use ApprovalStatus::*;
            assert_exact_edges(
                ApprovalStatus::ALL,
                &[(PendingApproval, Approved), (PendingApproval, Rejected)],
            );
        }
    }

    #[test]
    fn site_records() {
        {
            use SiteMeasurementStatus::*;
            assert_exact_edges(
                SiteMeasurementStatus::ALL,
                &[(Pending, Approved), (Pending, Rejected)],
            );
        }
        {
            use SiteIssueStatus::*;
            assert_exact_edges(
                SiteIssueStatus::ALL,
                &[(Open, Resolved), (Open, Closed), (Resolved, Closed)],
            );
        }
        {
            use DeliveryIssueStatus::*;
            assert_exact_edges(
                DeliveryIssueStatus::ALL,
                &[(Open, InProgress), (InProgress, Resolved), (Open, Resolved)],
            );
        }
    }

    #[test]
    fn receipt_cannot_clear_before_it_is_received() {
        assert!(ensure_transition(ReceiptStatus::Pending, ReceiptStatus::Cleared).is_err());
    }
}

// ============================================================================
// Property: Lifecycle Walks
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any walk through the paper lifecycle is accepted step by step and ends
    /// within as many steps as there are statuses
    #[test]
    fn prop_paper_walk_terminates(choices in prop::collection::vec(0usize..8, 0..20)) {
        let path = walk(PaperStatus::Draft, &choices);
        prop_assert!(path.len() <= PaperStatus::ALL.len());
        for pair in path.windows(2) {
            prop_assert!(ensure_transition(pair[0], pair[1]).is_ok());
        }
    }

    /// A purchase order walk never leaves Closed
    #[test]
    fn prop_po_closed_is_final(choices in prop::collection::vec(0usize..8, 0..20)) {
        let path = walk(PurchaseOrderStatus::Draft, &choices);
        if let Some(pos) = path.iter().position(|s| *s == PurchaseOrderStatus::Closed) {
            prop_assert_eq!(pos, path.len() - 1);
        }
        for pair in path.windows(2) {
            prop_assert!(ensure_transition(pair[0], pair[1]).is_ok());
        }
    }

    /// Status strings survive a store and reload
    #[test]
    fn prop_status_strings_round_trip(index in 0usize..64) {
        let paper = PaperStatus::ALL[index % PaperStatus::ALL.len()];
        prop_assert_eq!(parse_status::<PaperStatus>(paper.as_str()), Ok(paper));
        let invoice = InvoiceStatus::ALL[index % InvoiceStatus::ALL.len()];
        prop_assert_eq!(parse_status::<InvoiceStatus>(invoice.as_str()), Ok(invoice));
    }
}

// ============================================================================
// Role Group Tests
// ============================================================================

const GROUPS: &[RoleGroup] = &[
    RoleGroup::Admin,
    RoleGroup::AnyAuthenticated,
    RoleGroup::BillingExecutive,
    RoleGroup::AccountsManager,
    RoleGroup::AccountsExecutive,
    RoleGroup::AccountsUser,
    RoleGroup::FinanceHead,
    RoleGroup::Auditor,
    RoleGroup::DispatchExecutive,
    RoleGroup::DispatchSupervisor,
    RoleGroup::LogisticsManager,
    RoleGroup::LogisticsExecutive,
    RoleGroup::LogisticsUser,
    RoleGroup::Driver,
    RoleGroup::SalesUser,
    RoleGroup::SalesExecutive,
    RoleGroup::SalesManager,
    RoleGroup::MarketingExecutive,
    RoleGroup::PurchaseExecutive,
    RoleGroup::PurchaseManager,
    RoleGroup::StoreIncharge,
    RoleGroup::PurchaseUser,
    RoleGroup::QualityChecker,
    RoleGroup::ProductionManager,
    RoleGroup::ProductionScheduler,
    RoleGroup::ProductionSupervisor,
    RoleGroup::ProductionAccess,
    RoleGroup::RawMaterialChecker,
    RoleGroup::MeasurementCaptain,
    RoleGroup::MeasurementTaskAssigner,
    RoleGroup::SiteSupervisor,
    RoleGroup::CarpenterCaptain,
    RoleGroup::PartyEditor,
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A group admits exactly its members plus admin
    #[test]
    fn prop_group_membership(group_index in 0usize..64, role_index in 0usize..64) {
        let group = GROUPS[group_index % GROUPS.len()];
        let role = Role::ALL[role_index % Role::ALL.len()];
        prop_assert_eq!(
            group.permits(role),
            role == Role::Admin || group.members().contains(&role)
        );
    }
}

mod roles {
    use super::*;

    #[test]
    fn admin_passes_every_group() {
        for group in GROUPS {
            assert!(group.permits(Role::Admin), "{group:?}");
        }
    }

    #[test]
    fn role_strings_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(role.as_str()), Ok(*role));
        }
    }

    #[test]
    fn finance_head_can_override_credit() {
        assert!(RoleGroup::FinanceHead.permits(Role::FinanceHead));
        assert!(!RoleGroup::FinanceHead.permits(Role::AccountsManager));
    }
}
