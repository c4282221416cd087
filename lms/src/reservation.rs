pub mod domain;
pub mod scheduler;
pub mod worker;
