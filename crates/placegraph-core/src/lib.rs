pub mod config_manager;
pub mod error;
pub mod logging;
pub mod placetype;
pub mod traits;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use logging::init_tracing;
pub use placetype::*;
pub use traits::*;
pub use types::*;
