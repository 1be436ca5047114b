pub mod health;
pub mod room;
