pub mod registration;

pub use registration::RegistrationWorker;
