/// Frames a player should deliver per minute at 20 ms per frame.
pub const EXPECTED_FRAMES_PER_MINUTE: u64 = 3000;

const MINUTE_MS: u64 = 60_000;

/// Counts provided and missed frames in one-minute windows.
///
/// Numbers are only reported for a minute the player spent playing from
/// start to end, so track switches do not show up as loss.
#[derive(Debug, Default)]
pub struct AudioLossCounter {
    minute: u64,
    success: u64,
    loss: u64,
    last_success: u64,
    last_loss: u64,
    playing_since: Option<u64>,
}

impl AudioLossCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn roll(&mut self, now_ms: u64) {
        let minute = now_ms / MINUTE_MS;
        if minute == self.minute {
            return;
        }
        if minute == self.minute + 1 {
            self.last_success = self.success;
            self.last_loss = self.loss;
        } else {
            self.last_success = 0;
            self.last_loss = 0;
        }
        self.success = 0;
        self.loss = 0;
        self.minute = minute;
    }

    pub fn on_success(&mut self, now_ms: u64) {
        self.roll(now_ms);
        self.success += 1;
    }

    pub fn on_loss(&mut self, now_ms: u64) {
        self.roll(now_ms);
        self.loss += 1;
    }

    pub fn on_playing(&mut self, now_ms: u64) {
        self.playing_since.get_or_insert(now_ms);
    }

    pub fn on_stopped(&mut self) {
        self.playing_since = None;
    }

    /// `(provided, missed)` for the last complete minute, if it is representative.
    pub fn last_minute(&mut self, now_ms: u64) -> Option<(u64, u64)> {
        self.roll(now_ms);
        let last_minute_start = self.minute.checked_sub(1)? * MINUTE_MS;
        match self.playing_since {
            Some(since) if since <= last_minute_start => Some((self.last_success, self.last_loss)),
            _ => None,
        }
    }
}
