//! Draw rate limiting for continuous pointer input.

use crate::core::Point;

/// Why a place request was held back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Throttled {
    Cooldown { remaining_ms: u64 },
    TooClose { distance: f64 },
}

/// Enforces a minimum interval between placements and a minimum distance
/// between successive positions of one stroke.
#[derive(Clone, Debug)]
pub struct StrokeThrottle {
    cooldown_ms: u64,
    min_distance: f64,
    last_ms: Option<u64>,
    anchor: Option<Point>,
}

impl StrokeThrottle {
    pub fn new(cooldown_ms: u64, min_distance: f64) -> Self {
        Self {
            cooldown_ms,
            min_distance: min_distance.max(0.0),
            last_ms: None,
            anchor: None,
        }
    }

    pub fn from_seconds(cooldown_seconds: f64, min_distance: f64) -> Self {
        let cooldown_ms = (cooldown_seconds.max(0.0) * 1000.0).round() as u64;
        Self::new(cooldown_ms, min_distance)
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn check(&self, now_ms: u64, position: Point) -> Result<(), Throttled> {
        if let Some(last) = self.last_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < self.cooldown_ms {
                return Err(Throttled::Cooldown {
                    remaining_ms: self.cooldown_ms - elapsed,
                });
            }
        }
        if let Some(anchor) = self.anchor {
            let distance = anchor.distance(&position);
            if distance < self.min_distance {
                return Err(Throttled::TooClose { distance });
            }
        }
        Ok(())
    }

    pub fn record(&mut self, now_ms: u64, position: Point) {
        self.last_ms = Some(now_ms);
        self.anchor = Some(position);
    }

    /// Forget the stroke anchor; the cooldown still applies.
    pub fn end_stroke(&mut self) {
        self.anchor = None;
    }
}
