pub mod error;
pub mod greeting;
pub mod items;
pub mod sweep;
pub mod users;
