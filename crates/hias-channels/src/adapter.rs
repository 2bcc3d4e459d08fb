use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use hias_config::MqttConfig;
use hias_core::Result;

/// The per-agent topics under `{location}/Agents/{zone}/{entity}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentTopic {
    /// Retained `ONLINE`/`OFFLINE` presence.
    Status,
    /// Periodic heartbeat.
    Life,
    /// Inbound remote commands.
    Commands,
    /// Classification reports.
    Sensors,
}

impl AgentTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTopic::Status => "Status",
            AgentTopic::Life => "Life",
            AgentTopic::Commands => "Commands",
            AgentTopic::Sensors => "Sensors",
        }
    }
}

impl std::fmt::Display for AgentTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds full topic strings for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    prefix: String,
}

impl TopicBuilder {
    pub fn new(location: &str, zone: &str, entity: &str) -> Self {
        Self {
            prefix: format!("{location}/Agents/{zone}/{entity}"),
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(&config.location, &config.zone, &config.entity)
    }

    pub fn topic(&self, topic: AgentTopic) -> String {
        format!("{}/{}", self.prefix, topic)
    }

    /// Map a full topic string back to the agent topic, if it is one of ours.
    pub fn parse(&self, full: &str) -> Option<AgentTopic> {
        let suffix = full.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        [
            AgentTopic::Status,
            AgentTopic::Life,
            AgentTopic::Commands,
            AgentTopic::Sensors,
        ]
        .into_iter()
        .find(|t| t.as_str() == suffix)
    }
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    /// The agent topic it arrived on, when recognised.
    pub agent_topic: Option<AgentTopic>,
    pub payload: Vec<u8>,
}

/// Events emitted by a messaging channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The broker accepted the session (initially or after a reconnect).
    Connected,
    /// The session dropped; the channel will retry on its own.
    Disconnected(Option<String>),
    /// A message arrived.
    Message(InboundMessage),
}

/// One session with the platform's message broker.
///
/// Methods take `&self` so a single handle can be shared between the
/// coordinator and the HTTP server.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Establish the session. Calling it while connected is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Tear the session down. Safe to call when never connected, and idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Publish a JSON payload on one of the agent topics.
    async fn publish(&self, topic: AgentTopic, payload: &serde_json::Value) -> Result<()>;

    /// Hand out the receiver for inbound events. Returns `None` before
    /// `connect` or once it has been taken.
    fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>>;

    /// Whether the broker session is currently up.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        let topics = TopicBuilder::new("site1", "lab", "agent-7");
        assert_eq!(
            topics.topic(AgentTopic::Status),
            "site1/Agents/lab/agent-7/Status"
        );
        assert_eq!(
            topics.topic(AgentTopic::Commands),
            "site1/Agents/lab/agent-7/Commands"
        );
    }

    #[test]
    fn test_topic_parse() {
        let topics = TopicBuilder::new("site1", "lab", "agent-7");
        assert_eq!(
            topics.parse("site1/Agents/lab/agent-7/Commands"),
            Some(AgentTopic::Commands)
        );
        assert_eq!(topics.parse("site1/Agents/lab/agent-7/Other"), None);
        assert_eq!(topics.parse("site1/Agents/lab/agent-70/Life"), None);
    }

    #[test]
    fn test_topic_from_config_defaults() {
        let topics = TopicBuilder::from_config(&MqttConfig::default());
        assert_eq!(topics.topic(AgentTopic::Life), "hias/Agents/default/ai-agent/Life");
    }
}
