pub mod database;
pub mod push;
pub mod queue;
pub mod redis;
