pub mod aggregate;
pub mod controller;
pub mod discovery;
pub mod monitor;
pub mod quantity;
pub mod queue;
pub mod registry;
