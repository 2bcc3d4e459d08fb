//! Remote commands received on the agent's command topic.
//!
//! ```json
//! {"command": "classify", "features": [0.1, 0.7, 0.2]}
//! {"command": "status"}
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hias_channels::{AgentTopic, ChannelEvent, InboundMessage, MessagingChannel};
use hias_core::{AgentStatus, ClassificationReport, ReportSource, Result};
use hias_model::ModelFacade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum AgentCommand {
    /// Classify one feature vector and publish the report.
    Classify { features: Vec<f32> },
    /// Publish the agent's current status.
    Status,
}

impl AgentCommand {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Execute one command against the bound model, publishing the outcome.
pub async fn handle_command(
    command: AgentCommand,
    model: &dyn ModelFacade,
    channel: &dyn MessagingChannel,
) -> Result<()> {
    match command {
        AgentCommand::Classify { features } => {
            if !model.is_ready() {
                warn!("classify command ignored: model not loaded");
                return Ok(());
            }
            let prediction = model.classify(&features)?;
            info!(
                label = %prediction.label,
                confidence = prediction.confidence,
                "classified remote sample"
            );
            let report = ClassificationReport::new(ReportSource::Mqtt, model.kind().tag(), &prediction);
            channel
                .publish(AgentTopic::Sensors, &serde_json::to_value(&report)?)
                .await
        }
        AgentCommand::Status => {
            let status = serde_json::json!({
                "Status": AgentStatus::Online.as_str(),
                "Model": model.kind().tag(),
                "Ready": model.is_ready(),
            });
            channel.publish(AgentTopic::Life, &status).await
        }
    }
}

async fn handle_message(
    message: InboundMessage,
    model: &dyn ModelFacade,
    channel: &dyn MessagingChannel,
) {
    if message.agent_topic != Some(AgentTopic::Commands) {
        debug!(topic = %message.topic, "ignoring message on unexpected topic");
        return;
    }
    let command = match AgentCommand::decode(&message.payload) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "invalid command payload");
            return;
        }
    };
    debug!(command = ?command, "command received");
    if let Err(e) = handle_command(command, model, channel).await {
        warn!(error = %e, "command failed");
    }
}

/// Consume channel events until the channel closes or shutdown is requested.
pub async fn dispatch_commands(
    mut events: mpsc::Receiver<ChannelEvent>,
    model: Arc<dyn ModelFacade>,
    channel: Arc<dyn MessagingChannel>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            event = events.recv() => {
                match event {
                    Some(ChannelEvent::Message(message)) => {
                        handle_message(message, model.as_ref(), channel.as_ref()).await;
                    }
                    Some(ChannelEvent::Connected) => info!(channel = %channel.id(), "channel online"),
                    Some(ChannelEvent::Disconnected(reason)) => {
                        warn!(channel = %channel.id(), reason = ?reason, "channel offline, retrying");
                    }
                    None => break,
                }
            }
        }
    }
    debug!("command dispatcher stopped");
}
