pub mod registration;
pub mod token;
