pub mod books;
pub mod catalog;
pub mod core;
pub mod gateway;
pub mod patrons;
pub mod reservation;
pub mod utils;
