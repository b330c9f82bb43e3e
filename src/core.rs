pub mod battery;
pub mod controller;
pub mod error;
pub mod forecast;
pub mod planner;
pub mod provider;
pub mod tariff;
pub mod trace;
