pub mod node;
pub mod config;
pub mod service_handle;
pub mod cli;

pub use node::Node;
pub use config::{ConfigError, EndpointConfig, ServiceConfig};
pub use service_handle::ServiceHandle;
pub use cli::run_cli;
