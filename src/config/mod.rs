//! Configuration system
//!
//! Loads the relay configuration with:
//! - Trello board credentials and the two list ids that drive the flows
//! - GitLab project and private token
//! - Mapping store location
//! - Timeouts and retry budgets for outbound calls

mod hub_config;
pub mod validation;

pub use hub_config::{
    GitLabIntegration, HubConfig, RunMode, ServerConfig, StoreConfig, SyncSettings,
    TrelloIntegration,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
