// Handle for a motion that was started without blocking

use tracing::debug;

use super::actuator::{Actuator, Stop};
use super::error::Result;

/// Result of a motion that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Final relative angle of the awaited actuator
    pub angle_deg: i32,
}

/// Steering move performed once the drive segment is over.
/// `pending` is the owner's flag, cleared once the move has been made.
pub(crate) struct Recenter<'a, A: Actuator> {
    pub actuator: &'a mut A,
    pub target: i32,
    pub speed: i32,
    pub pending: &'a mut bool,
}

impl<A: Actuator> Recenter<'_, A> {
    fn run(self) -> Result<()> {
        self.actuator.run_target(self.speed, self.target, Stop::Hold)?;
        self.actuator.wait()?;
        *self.pending = false;
        Ok(())
    }
}

/// A motion in progress.
///
/// The handle borrows the robot, so no other command can be issued while it is
/// held. Dropping it leaves the motion running; the next command to the same
/// actuator replaces it.
///
/// Only one actuator is awaited. For two-wheel moves that is the right wheel, and
/// the left (companion) wheel may still be finishing when `wait` returns.
#[must_use = "dropping the handle lets the motion run unobserved"]
pub struct MotionHandle<'a, A: Actuator> {
    awaited: &'a mut A,
    companion: Option<&'a mut A>,
    then: Stop,
    recenter: Option<Recenter<'a, A>>,
}

impl<'a, A: Actuator> MotionHandle<'a, A> {
    pub(crate) fn new(awaited: &'a mut A, then: Stop) -> Self {
        Self {
            awaited,
            companion: None,
            then,
            recenter: None,
        }
    }

    pub(crate) fn with_companion(mut self, companion: &'a mut A) -> Self {
        self.companion = Some(companion);
        self
    }

    pub(crate) fn with_recenter(mut self, recenter: Recenter<'a, A>) -> Self {
        self.recenter = Some(recenter);
        self
    }

    /// Whether the awaited actuator has finished its move
    pub fn is_done(&mut self) -> Result<bool> {
        Ok(self.awaited.is_done()?)
    }

    /// Block until the awaited actuator completes
    pub fn wait(self) -> Result<Completion> {
        self.awaited.wait()?;
        let angle_deg = self.awaited.angle()?;
        if let Some(recenter) = self.recenter {
            recenter.run()?;
        }
        debug!("Motion complete at {} deg", angle_deg);
        Ok(Completion { angle_deg })
    }

    /// Stop every actuator the motion drives, using the motion's stop mode
    pub fn cancel(self) -> Result<()> {
        debug!("Cancelling motion (then={:?})", self.then);
        if let Some(companion) = self.companion {
            companion.stop(self.then)?;
        }
        self.awaited.stop(self.then)?;
        if let Some(recenter) = self.recenter {
            recenter.run()?;
        }
        Ok(())
    }
}
