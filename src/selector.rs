use crate::node::Node;

/// Picks the node a new player is created on.
pub trait NodeSelector: Send + Sync {
    /// Index into `nodes` of the node serving `guild_id`, `None` when no node
    /// can be used.
    fn select(&self, guild_id: u64, nodes: &[Node]) -> Option<usize>;
}

/// Spreads guilds over nodes the same way the host platform spreads them
/// over shards.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuildHash;

impl NodeSelector for GuildHash {
    fn select(&self, guild_id: u64, nodes: &[Node]) -> Option<usize> {
        if nodes.is_empty() {
            return None;
        }

        Some(guild_index(guild_id, nodes.len()))
    }
}

/// Picks the connected node with the lowest load penalty. Nodes that have
/// not reported stats yet count as idle. Existing players are not moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl NodeSelector for LeastLoaded {
    fn select(&self, guild_id: u64, nodes: &[Node]) -> Option<usize> {
        let best = nodes.iter()
            .enumerate()
            .filter(|(_, node)| node.is_online())
            .map(|(index, node)| (index, node.stats().map_or(0.0, |s| s.penalty())))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index);

        best.or_else(|| GuildHash.select(guild_id, nodes))
    }
}

#[inline]
fn guild_index(guild_id: u64, count: usize) -> usize {
    ((guild_id >> 22) % count as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::testing::shared;

    fn nodes(count: u16) -> Vec<Node> {
        let (shared, _, _) = shared();

        (0..count).map(|i| Node::new(NodeConfig::new("localhost", 2333 + i, "pw"), shared.clone())).collect()
    }

    #[test]
    fn guild_hash_uses_shard_formula() {
        let nodes = nodes(3);
        let guild = 5u64 << 22;

        assert_eq!(GuildHash.select(guild, &nodes), Some(2));
        assert_eq!(GuildHash.select(guild, &nodes[..1]), Some(0));
        assert_eq!(GuildHash.select(guild, &[]), None);
    }

    #[test]
    fn least_loaded_falls_back_to_hash_when_offline() {
        let nodes = nodes(2);
        let guild = 1u64 << 22;

        assert_eq!(LeastLoaded.select(guild, &nodes), Some(1));
        assert_eq!(LeastLoaded.select(guild, &[]), None);
    }
}
