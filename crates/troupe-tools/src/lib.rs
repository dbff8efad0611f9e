pub mod builtin;
pub mod registry;
pub mod store;

pub use registry::ToolRegistry;
pub use store::DirStore;
