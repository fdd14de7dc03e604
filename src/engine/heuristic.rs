//! Input-Wait Heuristic
//!
//! Nothing outside a process can observe that it is blocked in a read of
//! standard input, so the engine guesses from silence: if no output arrives
//! for a short window, the program is assumed to be waiting.
//!
//! Both failure modes are expected. A program computing quietly for longer
//! than the window gets a premature `stdin_request`. A program whose output
//! trickles in faster than the window never gets one while it keeps printing.

use std::time::Duration;
use tokio::time::Instant;

/// One-shot deadline re-armed by program activity
#[derive(Debug, Clone)]
pub struct InputWaitDetector {
    quiet: Duration,
    startup: Duration,
    deadline: Option<Instant>,
}

impl InputWaitDetector {
    pub fn new(quiet: Duration, startup: Duration) -> Self {
        Self {
            quiet,
            startup,
            deadline: None,
        }
    }

    /// Arm the startup window right after spawn
    pub fn arm_startup(&mut self, now: Instant) {
        self.deadline = Some(now + self.startup);
    }

    /// Output arrived; restart the quiet window
    pub fn on_output(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    /// A line was delivered; the program may block again without printing
    pub fn on_input(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline if it has passed
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> InputWaitDetector {
        InputWaitDetector::new(Duration::from_millis(200), Duration::from_millis(300))
    }

    #[test]
    fn test_startup_window() {
        let mut d = detector();
        let t0 = Instant::now();
        assert!(!d.fire(t0));

        d.arm_startup(t0);
        assert!(!d.fire(t0 + Duration::from_millis(299)));
        assert!(d.fire(t0 + Duration::from_millis(300)));
        // one-shot
        assert!(!d.fire(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_output_rearms_quiet_window() {
        let mut d = detector();
        let t0 = Instant::now();
        d.arm_startup(t0);

        d.on_output(t0 + Duration::from_millis(250));
        assert!(!d.fire(t0 + Duration::from_millis(300)));
        assert!(!d.fire(t0 + Duration::from_millis(449)));
        assert!(d.fire(t0 + Duration::from_millis(450)));
    }

    #[test]
    fn test_trickling_output_never_fires() {
        let mut d = detector();
        let mut now = Instant::now();
        d.arm_startup(now);
        for _ in 0..20 {
            now += Duration::from_millis(150);
            assert!(!d.fire(now));
            d.on_output(now);
        }
    }

    #[test]
    fn test_disarm() {
        let mut d = detector();
        let t0 = Instant::now();
        d.on_input(t0);
        assert_eq!(d.deadline(), Some(t0 + Duration::from_millis(200)));
        d.disarm();
        assert!(!d.fire(t0 + Duration::from_secs(1)));
    }
}
