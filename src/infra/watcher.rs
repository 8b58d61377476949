// ============================================================
// Layer 6: Checkpoint Watcher
// ============================================================
// Blocks until a checkpoint source reports a checkpoint that has
// not been handed out before. Used by the evaluation loop, which
// must never evaluate the same checkpoint twice in a row.

use anyhow::Result;
use std::{thread, time::Duration};

use crate::domain::checkpoint::Checkpoint;
use crate::domain::traits::CheckpointSource;

pub const DEFAULT_POLL: Duration = Duration::from_secs(1);

pub struct CheckpointWatcher<S: CheckpointSource> {
    source: S,
    last:   Option<Checkpoint>,
    poll:   Duration,
}

impl<S: CheckpointSource> CheckpointWatcher<S> {
    pub fn new(source: S, poll: Duration) -> Self {
        Self { source, last: None, poll }
    }

    /// Check once; `Some` only for a checkpoint not seen before.
    pub fn poll_once(&mut self) -> Result<Option<Checkpoint>> {
        match self.source.latest()? {
            Some(ckpt) if self.last.as_ref() != Some(&ckpt) => {
                self.last = Some(ckpt.clone());
                Ok(Some(ckpt))
            }
            _ => Ok(None),
        }
    }

    /// Sleep-poll until a new checkpoint shows up.
    pub fn wait_for_new(&mut self) -> Result<Checkpoint> {
        let mut announced = false;
        loop {
            if let Some(ckpt) = self.poll_once()? {
                tracing::info!("Found new checkpoint '{}'", ckpt.name());
                return Ok(ckpt);
            }
            if !announced {
                tracing::info!("Waiting for a new checkpoint...");
                announced = true;
            }
            thread::sleep(self.poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque};

    /// Reports a scripted sequence of "latest" answers, then repeats the last one.
    struct Scripted {
        answers: RefCell<VecDeque<Option<Checkpoint>>>,
    }

    impl CheckpointSource for Scripted {
        fn latest(&self) -> Result<Option<Checkpoint>> {
            let mut answers = self.answers.borrow_mut();
            if answers.len() > 1 {
                Ok(answers.pop_front().flatten())
            } else {
                Ok(answers.front().cloned().flatten())
            }
        }
    }

    fn ckpt(step: u64) -> Checkpoint {
        Checkpoint::new(format!("/ckpt/model-{step}"), step)
    }

    #[test]
    fn test_same_checkpoint_is_reported_once() {
        let source = Scripted {
            answers: RefCell::new(VecDeque::from(vec![None, Some(ckpt(1)), Some(ckpt(1)), Some(ckpt(2))])),
        };
        let mut watcher = CheckpointWatcher::new(source, Duration::from_millis(1));

        assert_eq!(watcher.poll_once().unwrap(), None);
        assert_eq!(watcher.poll_once().unwrap(), Some(ckpt(1)));
        assert_eq!(watcher.poll_once().unwrap(), None);
        assert_eq!(watcher.wait_for_new().unwrap(), ckpt(2));
    }
}
