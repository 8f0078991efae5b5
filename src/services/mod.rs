pub mod health_service;
pub mod registration;
pub mod subscription;
pub mod validator;

pub use health_service::HealthService;
pub use registration::BatchProcessor;
pub use subscription::{SubscriptionManager, SubscriptionOutcome};
pub use validator::{TokenValidator, ValidationError};
