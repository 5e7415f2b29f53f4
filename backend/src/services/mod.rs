//! Business logic services for the Doorworks ERP

pub mod accounts;
pub mod auth;
pub mod billing;
pub mod catalog;
pub mod departments;
pub mod dispatch;
pub mod logistics;
pub mod numbering;
pub mod parties;
pub mod production;
pub mod purchase;
pub mod quality;
pub mod sales;
pub mod scheduling;
pub mod site;
pub mod status;
pub mod supervisor;
pub mod users;

pub use accounts::AccountsService;
pub use auth::AuthService;
pub use billing::BillingService;
pub use catalog::CatalogService;
pub use departments::DepartmentService;
pub use dispatch::DispatchService;
pub use logistics::LogisticsService;
pub use parties::PartyService;
pub use production::ProductionService;
pub use purchase::PurchaseService;
pub use quality::QualityService;
pub use sales::SalesService;
pub use scheduling::SchedulingService;
pub use site::SiteService;
pub use supervisor::SupervisorService;
pub use users::UserService;
