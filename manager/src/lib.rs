pub mod coordinator;
pub mod heartbeat;
pub mod registry;
pub mod service;

pub use registry::Registry;
pub use service::Manager;
