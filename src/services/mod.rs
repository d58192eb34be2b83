//! Backend registry and selection services.

pub mod backend_registry;
pub mod backend_selector;

pub use backend_registry::BackendRegistry;
pub use backend_selector::BackendSelector;
