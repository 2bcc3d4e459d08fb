//! # hias-channels
//!
//! The agent's messaging channel. [`MqttChannel`] holds one session with the
//! HIAS broker and exposes it through the [`MessagingChannel`] trait, so the
//! coordinator and the HTTP server can share a handle without knowing about
//! MQTT.
//!
//! ## Topics
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `{location}/Agents/{zone}/{entity}/Status` | out, retained | `ONLINE` / `OFFLINE` (last-will) |
//! | `{location}/Agents/{zone}/{entity}/Life` | out | heartbeat JSON |
//! | `{location}/Agents/{zone}/{entity}/Commands` | in | command JSON |
//! | `{location}/Agents/{zone}/{entity}/Sensors` | out | classification reports |

pub mod adapter;
pub mod mock;
pub mod mqtt;

pub use adapter::{AgentTopic, ChannelEvent, InboundMessage, MessagingChannel, TopicBuilder};
pub use mock::MockChannel;
pub use mqtt::MqttChannel;
