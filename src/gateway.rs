use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::BoxError;
use crate::model::voice::GatewayPacket;

/// Sends packets through the host platform's gateway, on the shard that owns
/// the guild.
#[async_trait]
pub trait GatewaySender: Send + Sync {
    async fn send_gateway_packet(&self, guild_id: u64, packet: GatewayPacket) -> Result<(), BoxError>;
}

/// Forwards packets to a channel, leaving delivery to whoever drains it.
#[async_trait]
impl GatewaySender for UnboundedSender<(u64, GatewayPacket)> {
    async fn send_gateway_packet(&self, guild_id: u64, packet: GatewayPacket) -> Result<(), BoxError> {
        self.send((guild_id, packet)).map_err(|_| "gateway channel closed".into())
    }
}
