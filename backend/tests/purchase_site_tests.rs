//! Purchase and site installation tests
//!
//! Property and unit tests for:
//! - Purchase order and goods receipt totals
//! - Order status after receipt
//! - Flat fixing gaps and pending doors

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    completion_percent, compute_grn_totals, compute_po_totals, pending_doors, DoorRequirements,
    FixingGapCounts, GrnLine, PurchaseOrderLine, PurchaseOrderStatus,
};

fn qty(n: i64) -> Decimal {
    Decimal::from(n)
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn po_line_strategy() -> impl Strategy<Value = PurchaseOrderLine> {
    (1i64..1_000, 1i64..10_000_000, prop_oneof![Just(0i64), Just(5), Just(12), Just(18)]).prop_map(
        |(quantity, rate_paise, tax)| PurchaseOrderLine {
            item_name: "Teak veneer sheet".to_string(),
            quantity: qty(quantity),
            unit: Some("sheet".to_string()),
            rate: Decimal::new(rate_paise, 2),
            tax_percent: qty(tax),
        },
    )
}

/// GRN line with rejected never above received
fn grn_line_strategy() -> impl Strategy<Value = GrnLine> {
    (0i64..5_000)
        .prop_flat_map(|received| (Just(received), 0i64..=received))
        .prop_map(|(received, rejected)| GrnLine {
            item_name: "Hinges 4in".to_string(),
            received_quantity: qty(received),
            rejected_quantity: qty(rejected),
            rejection_reason: (rejected > 0).then(|| "Rusted".to_string()),
        })
}

fn flags_strategy() -> impl Strategy<Value = Vec<(bool, bool)>> {
    prop::collection::vec((any::<bool>(), any::<bool>()), 0..60)
}

// ============================================================================
// Property: Purchase Totals
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// total = subtotal + tax, subtotal = Σ quantity × rate
    #[test]
    fn prop_po_totals(lines in prop::collection::vec(po_line_strategy(), 0..10)) {
        let totals = compute_po_totals(&lines);
        let subtotal: Decimal = lines.iter().map(|l| l.quantity * l.rate).sum();
        let quantity: Decimal = lines.iter().map(|l| l.quantity).sum();
        prop_assert_eq!(totals.subtotal, subtotal);
        prop_assert_eq!(totals.total_amount, totals.subtotal + totals.tax_amount);
        prop_assert_eq!(totals.total_quantity, quantity);
        prop_assert_eq!(totals.tax_amount, totals.tax_amount.round_dp(2));
    }

    /// accepted = received - rejected across the whole note
    #[test]
    fn prop_grn_totals(lines in prop::collection::vec(grn_line_strategy(), 0..10)) {
        let totals = compute_grn_totals(&lines).unwrap();
        prop_assert_eq!(totals.accepted, totals.received - totals.rejected);
        prop_assert!(totals.accepted >= Decimal::ZERO);
    }

    /// A single over-rejected line invalidates the note
    #[test]
    fn prop_grn_over_rejection_refused(
        mut lines in prop::collection::vec(grn_line_strategy(), 0..5),
        received in 0i64..1_000,
        excess in 1i64..100,
    ) {
        lines.push(GrnLine {
            item_name: "Door lock".to_string(),
            received_quantity: qty(received),
            rejected_quantity: qty(received + excess),
            rejection_reason: None,
        });
        prop_assert!(compute_grn_totals(&lines).is_err());
    }

    /// Orders close once everything ordered has been received
    #[test]
    fn prop_after_receipt(ordered in 1i64..10_000, received in 0i64..20_000) {
        let status = PurchaseOrderStatus::after_receipt(qty(ordered), qty(received));
        if received >= ordered {
            prop_assert_eq!(status, PurchaseOrderStatus::Closed);
        } else {
            prop_assert_eq!(status, PurchaseOrderStatus::PartiallyReceived);
        }
    }
}

// ============================================================================
// Property: Site Fixing Reports
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every flat lands in exactly one gap category
    #[test]
    fn prop_gap_counts_cover_every_flat(flags in flags_strategy()) {
        let mut counts = FixingGapCounts::default();
        for (frame, door) in &flags {
            counts.record(*frame, *door);
        }
        let total = counts.complete + counts.door_pending + counts.frame_missing + counts.not_started;
        prop_assert_eq!(total, flags.len() as i64);
        let complete = flags.iter().filter(|(f, d)| *f && *d).count() as i64;
        prop_assert_eq!(counts.complete, complete);
    }

    /// Completion percentage stays within 0..=100
    #[test]
    fn prop_completion_percent_bounds(total in 0i64..500, share in 0i64..=100) {
        let fixed = total * share / 100;
        let pct = completion_percent(fixed, total);
        prop_assert!(pct >= Decimal::ZERO);
        prop_assert!(pct <= Decimal::ONE_HUNDRED);
        if total == 0 {
            prop_assert_eq!(pct, Decimal::ZERO);
        }
    }

    /// Pending doors are the required doors minus those already fixed
    #[test]
    fn prop_pending_doors_subset(
        main in any::<bool>(),
        bedroom in any::<bool>(),
        bathroom in any::<bool>(),
        kitchen in any::<bool>(),
        fixed_mask in 0u8..16,
    ) {
        let required = DoorRequirements {
            main_door: main,
            bedroom_door: bedroom,
            bathroom_door: bathroom,
            kitchen_door: kitchen,
        };
        let all = ["Main Door", "Bedroom Door", "Bathroom Door", "Kitchen Door"];
        let fixed: Vec<&str> = all
            .iter()
            .enumerate()
            .filter(|(i, _)| fixed_mask & (1 << i) != 0)
            .map(|(_, label)| *label)
            .collect();

        let pending = pending_doors(required, fixed.iter().copied());
        let labels = required.labels();
        for door in &pending {
            prop_assert!(labels.contains(door));
            prop_assert!(!fixed.contains(door));
        }
        prop_assert_eq!(
            pending.len(),
            labels.iter().filter(|l| !fixed.contains(*l)).count()
        );
    }
}

mod pending_door_matching {
    use super::*;

    #[test]
    fn door_type_match_ignores_case_and_spaces() {
        let required = DoorRequirements {
            main_door: true,
            bedroom_door: true,
            bathroom_door: false,
            kitchen_door: false,
        };
        assert_eq!(pending_doors(required, [" main door "]), vec!["Bedroom Door"]);
        assert!(pending_doors(required, ["MAIN DOOR", "bedroom door"]).is_empty());
    }

    #[test]
    fn nothing_required_nothing_pending() {
        assert!(pending_doors(DoorRequirements::default(), std::iter::empty()).is_empty());
    }
}
