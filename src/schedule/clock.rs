use std::cell::Cell;
use std::time::Instant;

/// フレーム処理時間の計測元（ミリ秒）
pub trait FrameClock: Send {
    fn now_ms(&self) -> f64;
}

/// `Instant` による実時間
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// 読むたびに一定時間だけ進む時計。録画のオフライン処理や再現テスト用
pub struct SteppedClock {
    now: Cell<f64>,
    step_ms: f64,
}

impl SteppedClock {
    pub fn new(step_ms: f64) -> Self {
        Self {
            now: Cell::new(0.0),
            step_ms,
        }
    }
}

impl FrameClock for SteppedClock {
    fn now_ms(&self) -> f64 {
        let t = self.now.get();
        self.now.set(t + self.step_ms);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepped_clock() {
        let c = SteppedClock::new(2.5);
        assert_eq!(c.now_ms(), 0.0);
        assert_eq!(c.now_ms(), 2.5);
        assert_eq!(c.now_ms(), 5.0);
    }

    #[test]
    fn test_monotonic_clock_non_decreasing() {
        let c = MonotonicClock::new();
        let a = c.now_ms();
        let b = c.now_ms();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
