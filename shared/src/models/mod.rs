//! Domain models for the door and frame ERP

mod accounts;
mod billing;
mod dispatch;
mod logistics;
mod master;
mod production;
mod purchase;
mod quality;
mod sales;
mod site;

pub use accounts::*;
pub use billing::*;
pub use dispatch::*;
pub use logistics::*;
pub use master::*;
pub use production::*;
pub use purchase::*;
pub use quality::*;
pub use sales::*;
pub use site::*;
