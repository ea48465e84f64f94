pub mod hub_client;

pub use hub_client::{HttpHubClient, HubClient};
