pub mod layout;
pub mod retention;
