// Live delivery surface
//
// Wire events exchanged with connected employees and the gateway that turns
// them into presence and inbox operations.

pub mod events;
pub mod gateway;

pub use events::{ClientEvent, LiveNotification, ServerEvent};
pub use gateway::{GatewayError, RealtimeGateway};
