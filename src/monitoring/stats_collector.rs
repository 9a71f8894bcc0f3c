use std::time::Instant;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::{
    player::EXPECTED_FRAMES_PER_MINUTE,
    protocol::{Cpu, FrameStats, Memory, Stats},
};

/// Samples host and process load for the periodic `stats` message.
pub struct StatsCollector {
    started: Instant,
    system: Mutex<System>,
    pid: Option<Pid>,
    cores: usize,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
            cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn collect(
        &self,
        players: usize,
        playing_players: usize,
        frame_stats: Option<FrameStats>,
    ) -> Stats {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();

        let process = self.pid.and_then(|pid| {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            system.process(pid).map(|p| (p.memory(), p.cpu_usage()))
        });

        let total = system.total_memory();
        let used = process.map_or(system.used_memory(), |(memory, _)| memory);
        let process_load = process.map_or(0.0, |(_, cpu)| cpu as f64 / 100.0);

        Stats {
            players,
            playing_players,
            uptime: self.uptime_ms(),
            memory: Memory {
                free: total.saturating_sub(used),
                used,
                allocated: used,
                reservable: total,
            },
            cpu: Cpu {
                cores: self.cores,
                system_load: (system.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0),
                lavalink_load: (process_load / self.cores as f64).clamp(0.0, 1.0),
            },
            frame_stats,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Averages `(provided, missed)` minute counts across players.
pub fn average_frame_stats(counts: &[(u64, u64)]) -> Option<FrameStats> {
    if counts.is_empty() {
        return None;
    }
    let players = counts.len() as i64;
    let sent: i64 = counts.iter().map(|(s, _)| *s as i64).sum();
    let nulled: i64 = counts.iter().map(|(_, n)| *n as i64).sum();
    let expected = players * EXPECTED_FRAMES_PER_MINUTE as i64;

    Some(FrameStats {
        sent: sent / players,
        nulled: nulled / players,
        deficit: (expected - (sent + nulled)) / players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_stats_average_per_player() {
        assert_eq!(average_frame_stats(&[]), None);
        assert_eq!(
            average_frame_stats(&[(3000, 0), (2900, 50)]),
            Some(FrameStats {
                sent: 2950,
                nulled: 25,
                deficit: 25,
            })
        );
    }

    #[test]
    fn collected_stats_are_sane() {
        let collector = StatsCollector::new();
        let stats = collector.collect(3, 1, None);
        assert_eq!(stats.players, 3);
        assert_eq!(stats.playing_players, 1);
        assert!(stats.cpu.cores >= 1);
        assert!((0.0..=1.0).contains(&stats.cpu.system_load));
        assert!(stats.memory.reservable >= stats.memory.used);
    }
}
