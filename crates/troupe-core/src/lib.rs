pub mod config;
pub mod error;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, TroupeError};
pub use state::{Message, Reducer, Schema, State, StateUpdate};
pub use types::*;
