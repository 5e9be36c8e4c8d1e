pub mod client;
pub mod stream;

pub use client::ApiClient;
pub use stream::{TransportError, TurnStream};
