//! Fleet status rows and table rendering

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use libfleet_core::format_shard_ids;
use serde::Serialize;

use crate::cluster::Cluster;

/// Snapshot of one cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub name: String,
    pub shard_ids: Vec<u32>,
    pub pid: Option<u32>,
    pub alive: bool,
    pub ready: bool,
    pub restarts: u64,
    pub crash_looping: bool,
    pub consecutive_crashes: u32,
    pub last_exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl ClusterStatus {
    pub fn of(cluster: &mut Cluster) -> Self {
        Self {
            alive: cluster.is_alive(),
            name: cluster.name().to_string(),
            shard_ids: cluster.shard_ids().to_vec(),
            pid: cluster.pid(),
            ready: cluster.is_ready(),
            restarts: cluster.restarts(),
            crash_looping: cluster.is_crash_looping(),
            consecutive_crashes: cluster.consecutive_crashes(),
            last_exit_code: cluster.last_exit_code(),
            started_at: cluster.started_at(),
        }
    }

    fn state(&self) -> &'static str {
        match (self.alive, self.ready, self.crash_looping) {
            (_, _, true) if !self.alive => "backoff",
            (true, true, _) => "ready",
            (true, false, _) => "starting",
            (false, _, _) => "down",
        }
    }
}

/// Render status rows as a table
pub fn render(rows: &[ClusterStatus]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Cluster", "Shards", "PID", "State", "Restarts", "Crashes", "Last exit", "Started"]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.name),
            Cell::new(format_shard_ids(&row.shard_ids)),
            Cell::new(row.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(row.state()),
            Cell::new(row.restarts),
            Cell::new(row.consecutive_crashes),
            Cell::new(
                row.last_exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                row.started_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, alive: bool, ready: bool, crash_looping: bool) -> ClusterStatus {
        ClusterStatus {
            name: name.to_string(),
            shard_ids: vec![3, 4, 5],
            pid: alive.then_some(4242),
            alive,
            ready,
            restarts: 2,
            crash_looping,
            consecutive_crashes: if crash_looping { 5 } else { 0 },
            last_exit_code: (!alive).then_some(1),
            started_at: None,
        }
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(row("Alpha", true, true, false).state(), "ready");
        assert_eq!(row("Alpha", true, false, false).state(), "starting");
        assert_eq!(row("Alpha", false, false, false).state(), "down");
        assert_eq!(row("Alpha", false, false, true).state(), "backoff");
    }

    #[test]
    fn test_render_contains_rows() {
        let out = render(&[row("Beta", true, true, false), row("Charlie", false, false, false)]);
        assert!(out.contains("Beta"));
        assert!(out.contains("3,4,5"));
        assert!(out.contains("4242"));
        assert!(out.contains("Charlie"));
        assert!(out.contains("down"));
        assert!(out.contains("Crashes"));
    }
}
