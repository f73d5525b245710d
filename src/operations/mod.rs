pub mod add;
pub mod backup;
pub mod balance;
pub mod budget;
pub mod categories;
pub mod dashboard;
pub mod forecast;
pub mod import;
pub mod recurrence;
pub mod remove;
pub mod report;
pub mod savings;
pub mod scenarios;
pub mod search_by_category;
pub mod whatif;
