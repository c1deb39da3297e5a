use serde::{Deserialize, Serialize};

/// Statistics periodically reported by a node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Number of existing players.
    pub players: u64,
    /// Number of players currently playing.
    pub playing_players: u64,
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    /// Audio frame statistics, only present while players are active.
    #[serde(default)]
    pub frame_stats: Option<FrameStats>
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    /// Total system load, between 0 and 1.
    pub system_load: f64,
    /// Load caused by the node process, between 0 and 1.
    pub lavalink_load: f64
}

/// Per-minute averages of frames sent, nulled and missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64
}

impl ServerStats {
    /// Load penalty used when picking the least busy node. Lower is better.
    pub fn penalty(&self) -> f64 {
        let cpu = 1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0;
        let frames = self.frame_stats.as_ref().map_or(0.0, |f| {
            let deficit = 1.03f64.powf(500.0 * (f.deficit as f64 / 3000.0)) * 600.0 - 600.0;
            let nulled = (1.03f64.powf(500.0 * (f.nulled as f64 / 3000.0)) * 300.0 - 300.0) * 2.0;
            deficit + nulled
        });

        self.playing_players as f64 + cpu + frames
    }
}
