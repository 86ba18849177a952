pub mod config;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod model;
pub mod pool;
pub mod queue;
pub mod worker;
