pub mod health;
pub mod odds;
pub mod races;
