pub mod activity;
pub mod churn;
pub mod cochange;
pub mod commit;
pub mod deps;
pub mod ownership;
pub mod report;
pub mod request;
