use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DWELL: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Idle,
    Confirming { tracking_id: u32 },
    Confirmed { tracking_id: u32 },
}

/// Dwell timer for the object held over the reticle. Progress only ever grows while the same
/// tracking id keeps being reported and reaches exactly 1.0 once the dwell has elapsed.
#[derive(Debug)]
pub struct ConfirmationController {
    dwell: Duration,
    tracked_id: Option<u32>,
    started_at: Option<Instant>,
}

impl ConfirmationController {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            tracked_id: None,
            started_at: None,
        }
    }

    /// Keeps the timer running for `tracking_id`, or restarts it from zero for a new object.
    pub fn confirming(&mut self, tracking_id: u32) {
        if self.tracked_id == Some(tracking_id) {
            return;
        }
        self.tracked_id = Some(tracking_id);
        self.started_at = Some(Instant::now());
        tracing::debug!("Started confirming object {}", tracking_id);
    }

    pub fn reset(&mut self) {
        self.tracked_id = None;
        self.started_at = None;
    }

    pub fn progress(&self) -> f32 {
        let Some(started_at) = self.started_at else {
            return 0.0;
        };
        let elapsed = started_at.elapsed();
        if elapsed >= self.dwell {
            return 1.0;
        }
        let ratio = elapsed.as_secs_f32() / self.dwell.as_secs_f32();
        ratio.min(1.0 - f32::EPSILON)
    }

    pub fn is_confirmed(&self) -> bool {
        self.progress() == 1.0
    }

    pub fn tracked_id(&self) -> Option<u32> {
        self.tracked_id
    }

    pub fn state(&self) -> ConfirmationState {
        match self.tracked_id {
            None => ConfirmationState::Idle,
            Some(tracking_id) if self.is_confirmed() => {
                ConfirmationState::Confirmed { tracking_id }
            }
            Some(tracking_id) => ConfirmationState::Confirming { tracking_id },
        }
    }
}

impl Default for ConfirmationController {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn object_held_for_the_full_dwell_is_confirmed() {
        let mut controller = ConfirmationController::default();
        controller.confirming(42);
        let mut last = controller.progress();
        assert_eq!(last, 0.0);

        for _ in 0..30 {
            advance(Duration::from_millis(100)).await;
            controller.confirming(42);
            let progress = controller.progress();
            assert!(progress >= last);
            last = progress;
        }
        // 3000ms exactly.
        assert_eq!(controller.progress(), 1.0);
        assert_eq!(
            controller.state(),
            ConfirmationState::Confirmed { tracking_id: 42 }
        );

        advance(Duration::from_millis(100)).await;
        assert_eq!(controller.progress(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn not_confirmed_before_dwell_elapses() {
        let mut controller = ConfirmationController::default();
        controller.confirming(42);
        advance(Duration::from_millis(2_999)).await;
        controller.confirming(42);
        assert!(controller.progress() < 1.0);
        assert!(controller.progress() > 0.99);
        assert_eq!(
            controller.state(),
            ConfirmationState::Confirming { tracking_id: 42 }
        );
        advance(Duration::from_millis(101)).await;
        assert!(controller.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn new_tracking_id_restarts_the_timer() {
        let mut controller = ConfirmationController::default();
        controller.confirming(1);
        advance(Duration::from_millis(2_000)).await;
        assert!(controller.progress() > 0.6);

        controller.confirming(2);
        assert_eq!(controller.progress(), 0.0);
        assert_eq!(controller.tracked_id(), Some(2));
        advance(Duration::from_millis(1_500)).await;
        assert!((controller.progress() - 0.5).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn losing_the_object_forgets_progress() {
        let mut controller = ConfirmationController::default();
        controller.confirming(5);
        advance(Duration::from_millis(2_500)).await;
        controller.reset();
        assert_eq!(controller.state(), ConfirmationState::Idle);
        assert_eq!(controller.progress(), 0.0);

        controller.confirming(5);
        assert_eq!(controller.progress(), 0.0);
        advance(Duration::from_millis(1_000)).await;
        assert!(!controller.is_confirmed());
    }
}
