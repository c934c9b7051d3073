use crate::common::Frame;

/// Consumer of live camera frames. Called on the frame producer thread, so implementations must
/// hand the heavy work off instead of blocking.
pub trait FrameProcessor: Send {
    fn process(&mut self, frame: Frame);

    /// After this returns no result for an earlier frame may be reported.
    fn stop(&mut self);
}
