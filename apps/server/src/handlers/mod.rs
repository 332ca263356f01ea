pub mod client;
pub mod health;
pub mod payment;
pub mod staff;
