pub mod anchor;
pub mod budget;
pub mod category;
pub mod forecast;
pub mod recurrence;
pub mod rule;
pub mod savings;
pub mod scenario;
pub mod transaction;
