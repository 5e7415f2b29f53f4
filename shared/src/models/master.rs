//! Parties, products and other master data

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

crate::string_enum! {
    pub enum PartyApprovalStatus ("party approval status") {
        Draft => "Draft",
        PendingApproval => "pending_approval",
        Approved => "approved",
    }
}

impl Workflow for PartyApprovalStatus {
    const ENTITY: &'static str = "party";

    fn allowed_next(&self) -> &'static [Self] {
        use PartyApprovalStatus::*;
        match self {
            Draft => &[PendingApproval],
            PendingApproval => &[Approved],
            Approved => &[],
        }
    }
}

crate::string_enum! {
    pub enum ProductCategory ("product category") {
        Door => "Door",
        Frame => "Frame",
    }
}

/// Contact person embedded on a party
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactPerson {
    pub name: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Delivery site embedded on a party
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteAddress {
    #[serde(default)]
    pub site_name: Option<String>,
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub pin_code: Option<String>,
}

/// Commercial terms whose changes are written to the party history
#[derive(Debug, Clone, PartialEq)]
pub struct CreditTerms {
    pub payment_terms: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub credit_days: Option<i32>,
}

/// One changed field: name, old value, new value
pub type FieldChange = (&'static str, Option<String>, Option<String>);

impl CreditTerms {
    /// Fields that differ between `self` and `next`
    pub fn diff(&self, next: &CreditTerms) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        if self.payment_terms != next.payment_terms {
            changes.push(("payment_terms", self.payment_terms.clone(), next.payment_terms.clone()));
        }
        if self.credit_limit != next.credit_limit {
            changes.push((
                "credit_limit",
                self.credit_limit.map(|d| d.to_string()),
                next.credit_limit.map(|d| d.to_string()),
            ));
        }
        if self.credit_days != next.credit_days {
            changes.push((
                "credit_days",
                self.credit_days.map(|d| d.to_string()),
                next.credit_days.map(|d| d.to_string()),
            ));
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_term_diff() {
        let before = CreditTerms {
            payment_terms: Some("30 days".to_string()),
            credit_limit: Some(Decimal::from(500_000)),
            credit_days: Some(30),
        };
        let after = CreditTerms {
            payment_terms: Some("30 days".to_string()),
            credit_limit: Some(Decimal::from(750_000)),
            credit_days: Some(45),
        };
        let changes = before.diff(&after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].0, "credit_limit");
        assert_eq!(changes[0].2.as_deref(), Some("750000"));
        assert_eq!(changes[1], ("credit_days", Some("30".to_string()), Some("45".to_string())));
    }

    #[test]
    fn test_party_approval_flow() {
        assert!(PartyApprovalStatus::Draft.can_transition_to(PartyApprovalStatus::PendingApproval));
        assert!(!PartyApprovalStatus::Draft.can_transition_to(PartyApprovalStatus::Approved));
    }
}
