//! Service configuration management.
//!
//! All writes coming from the configuration API go through
//! [`ServiceConfigService`], which routes raw settings through the backend
//! registry before anything is persisted and refuses to change `kind`.

mod service_config;

pub use service_config::{NewServiceConfig, ServiceConfigService, ServiceConfigUpdate};
