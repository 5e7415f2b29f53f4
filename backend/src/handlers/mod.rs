//! HTTP request handlers, one module per business area

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod dispatch;
pub mod health;
pub mod logistics;
pub mod master;
pub mod production;
pub mod purchase;
pub mod quality;
pub mod sales;
pub mod site;
pub mod supervisor;

pub use health::health_check;
