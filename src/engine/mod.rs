pub mod activity;
pub mod budget;
pub mod churn;
pub mod cochange;
pub mod deps;
pub mod index;
pub mod ownership;
