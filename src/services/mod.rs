pub mod accounts;
pub mod admin;
pub mod booking;
pub mod catalog;
