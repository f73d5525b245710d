pub mod anchor_repository;
pub mod budget_repository;
pub mod category_repository;
pub mod connection;
pub mod forecast_repository;
pub mod repository;
pub mod rule_repository;
pub mod savings_repository;
pub mod scenario_repository;
pub mod sql;
