//! User roles and the role groups that gate each endpoint

use serde::{Deserialize, Serialize};

crate::string_enum! {
    /// Role stored on each user account
    pub enum Role ("role") {
        Admin => "admin",
        User => "user",
        ProductionManager => "production_manager",
        ProductionScheduler => "production_scheduler",
        ProductionSupervisor => "production_supervisor",
        RawMaterialChecker => "raw_material_checker",
        QualityChecker => "quality_checker",
        MeasurementCaptain => "measurement_captain",
        MarketingExecutive => "marketing_executive",
        SalesExecutive => "sales_executive",
        SalesManager => "sales_manager",
        SiteSupervisor => "site_supervisor",
        CarpenterCaptain => "carpenter_captain",
        BillingExecutive => "billing_executive",
        DispatchExecutive => "dispatch_executive",
        DispatchSupervisor => "dispatch_supervisor",
        LogisticsManager => "logistics_manager",
        LogisticsExecutive => "logistics_executive",
        Driver => "driver",
        AccountsManager => "accounts_manager",
        AccountsExecutive => "accounts_executive",
        FinanceHead => "finance_head",
        Auditor => "auditor",
        PurchaseExecutive => "purchase_executive",
        PurchaseManager => "purchase_manager",
        StoreIncharge => "store_incharge",
    }
}

/// Named set of roles allowed through an endpoint. Admin passes every group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleGroup {
    Admin,
    AnyAuthenticated,
    BillingExecutive,
    AccountsManager,
    AccountsExecutive,
    AccountsUser,
    FinanceHead,
    Auditor,
    DispatchExecutive,
    DispatchSupervisor,
    LogisticsManager,
    LogisticsExecutive,
    LogisticsUser,
    Driver,
    SalesUser,
    SalesExecutive,
    SalesManager,
    MarketingExecutive,
    PurchaseExecutive,
    PurchaseManager,
    StoreIncharge,
    PurchaseUser,
    QualityChecker,
    ProductionManager,
    ProductionScheduler,
    ProductionSupervisor,
    ProductionAccess,
    RawMaterialChecker,
    MeasurementCaptain,
    MeasurementTaskAssigner,
    SiteSupervisor,
    CarpenterCaptain,
    PartyEditor,
}

impl RoleGroup {
    /// Roles in the group besides admin
    pub fn members(&self) -> &'static [Role] {
        use Role::*;
        match self {
            RoleGroup::Admin => &[],
            RoleGroup::AnyAuthenticated => Role::ALL,
            RoleGroup::BillingExecutive => {
                &[BillingExecutive, AccountsManager, AccountsExecutive, FinanceHead]
            }
            RoleGroup::AccountsManager => &[AccountsManager, FinanceHead],
            RoleGroup::AccountsExecutive => &[AccountsExecutive, AccountsManager, FinanceHead],
            RoleGroup::AccountsUser => &[AccountsManager, AccountsExecutive, FinanceHead, Auditor],
            RoleGroup::FinanceHead => &[FinanceHead],
            RoleGroup::Auditor => &[Auditor, FinanceHead],
            RoleGroup::DispatchExecutive => {
                &[DispatchExecutive, DispatchSupervisor, LogisticsManager]
            }
            RoleGroup::DispatchSupervisor => &[DispatchSupervisor],
            RoleGroup::LogisticsManager => &[LogisticsManager],
            RoleGroup::LogisticsExecutive => &[LogisticsExecutive, LogisticsManager],
            RoleGroup::LogisticsUser => &[LogisticsManager, LogisticsExecutive, Driver],
            RoleGroup::Driver => &[Driver],
            RoleGroup::SalesUser => &[MarketingExecutive, SalesExecutive, SalesManager],
            RoleGroup::SalesExecutive => &[SalesExecutive, SalesManager, MarketingExecutive],
            RoleGroup::SalesManager => &[SalesManager],
            RoleGroup::MarketingExecutive => &[MarketingExecutive, SalesManager],
            RoleGroup::PurchaseExecutive => &[PurchaseExecutive, PurchaseManager],
            RoleGroup::PurchaseManager => &[PurchaseManager],
            RoleGroup::StoreIncharge => &[StoreIncharge],
            RoleGroup::PurchaseUser => &[PurchaseExecutive, PurchaseManager, StoreIncharge],
            RoleGroup::QualityChecker => &[QualityChecker],
            RoleGroup::ProductionManager => &[ProductionManager],
            RoleGroup::ProductionScheduler => &[ProductionScheduler],
            RoleGroup::ProductionSupervisor => &[ProductionSupervisor],
            RoleGroup::ProductionAccess => &[
                ProductionManager,
                MeasurementCaptain,
                ProductionScheduler,
                RawMaterialChecker,
            ],
            RoleGroup::RawMaterialChecker => &[RawMaterialChecker, ProductionManager],
            RoleGroup::MeasurementCaptain => &[MeasurementCaptain],
            RoleGroup::MeasurementTaskAssigner => {
                &[SiteSupervisor, MarketingExecutive, SalesExecutive, SalesManager]
            }
            RoleGroup::SiteSupervisor => &[SiteSupervisor],
            RoleGroup::CarpenterCaptain => &[CarpenterCaptain, SiteSupervisor],
            RoleGroup::PartyEditor => &[
                ProductionManager,
                MeasurementCaptain,
                ProductionScheduler,
                RawMaterialChecker,
                MarketingExecutive,
                SalesExecutive,
                SalesManager,
            ],
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        role == Role::Admin || self.members().contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_passes_every_group() {
        let groups = [
            RoleGroup::Admin,
            RoleGroup::BillingExecutive,
            RoleGroup::DispatchSupervisor,
            RoleGroup::PurchaseManager,
            RoleGroup::CarpenterCaptain,
        ];
        for group in groups {
            assert!(group.permits(Role::Admin), "{:?}", group);
        }
    }

    #[test]
    fn test_admin_group_is_exclusive() {
        assert!(!RoleGroup::Admin.permits(Role::FinanceHead));
        assert!(!RoleGroup::Admin.permits(Role::User));
    }

    #[test]
    fn test_billing_group() {
        assert!(RoleGroup::BillingExecutive.permits(Role::AccountsExecutive));
        assert!(RoleGroup::BillingExecutive.permits(Role::FinanceHead));
        assert!(!RoleGroup::BillingExecutive.permits(Role::DispatchExecutive));
    }

    #[test]
    fn test_dispatch_supervisor_only() {
        assert!(RoleGroup::DispatchSupervisor.permits(Role::DispatchSupervisor));
        assert!(!RoleGroup::DispatchSupervisor.permits(Role::DispatchExecutive));
    }

    #[test]
    fn test_any_authenticated() {
        for role in Role::ALL {
            assert!(RoleGroup::AnyAuthenticated.permits(*role));
        }
    }

    #[test]
    fn test_role_strings() {
        assert_eq!("store_incharge".parse::<Role>().unwrap(), Role::StoreIncharge);
        assert_eq!(Role::CarpenterCaptain.to_string(), "carpenter_captain");
        assert!("superuser".parse::<Role>().is_err());
    }
}
