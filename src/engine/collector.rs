//=========================================================================
// Command Collector
//=========================================================================
//
// Runtime command intake with bounded draining and shutdown detection.
//
// Architecture:
//   Sender<RuntimeCommand> (any thread)
//        ↓
//   collect_frame() → load requests → TickControl
//   pace(deadline)  → recv_timeout until the tick is due, buffering
//
//=========================================================================

//=== External Dependencies ===============================================

use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{info, warn};

//=== Internal Dependencies ===============================================

use crate::core::scene::LoadRequest;

//=== RuntimeCommand ======================================================

/// Commands accepted from other threads through
/// [`Runtime::command_sender`](crate::Runtime::command_sender).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    LoadScene(LoadRequest),
    Shutdown,
}

//=== TickControl =========================================================

/// Update loop control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Exit,
}

//=== CommandCollector ====================================================

pub(crate) struct CommandCollector {
    receiver: Receiver<RuntimeCommand>,
    buffered: Vec<RuntimeCommand>,
    requests: Vec<LoadRequest>,
}

impl CommandCollector {
    pub(crate) fn new(receiver: Receiver<RuntimeCommand>) -> Self {
        Self {
            receiver,
            buffered: Vec::new(),
            requests: Vec::with_capacity(1),
        }
    }

    /// Handles buffered and pending commands (bounded to prevent starvation).
    pub(crate) fn collect_frame(&mut self) -> TickControl {
        const MAX_COMMANDS_PER_FRAME: usize = 64;

        self.requests.clear();

        for command in std::mem::take(&mut self.buffered) {
            if self.handle_command(command) == TickControl::Exit {
                return TickControl::Exit;
            }
        }

        let mut drained = 0;
        while drained < MAX_COMMANDS_PER_FRAME {
            match self.receiver.try_recv() {
                Ok(command) => {
                    if self.handle_command(command) == TickControl::Exit {
                        return TickControl::Exit;
                    }
                    drained += 1;
                }
                Err(TryRecvError::Disconnected) => return TickControl::Exit,
                Err(TryRecvError::Empty) => break,
            }
        }

        if drained >= MAX_COMMANDS_PER_FRAME {
            warn!("Command queue backlog: drained {} commands this frame", drained);
        }

        TickControl::Continue
    }

    /// Blocks until `deadline`, buffering commands that arrive meanwhile
    /// for the next `collect_frame`.
    pub(crate) fn pace(&mut self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok(command) => self.buffered.push(command),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Takes the load requests collected this frame, in arrival order.
    pub(crate) fn take_requests(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.requests)
    }

    fn handle_command(&mut self, command: RuntimeCommand) -> TickControl {
        match command {
            RuntimeCommand::LoadScene(request) => {
                self.requests.push(request);
                TickControl::Continue
            }
            RuntimeCommand::Shutdown => {
                info!("Shutdown requested");
                TickControl::Exit
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn collect_handles_empty_queue() {
        let (_tx, rx) = unbounded::<RuntimeCommand>();
        let mut collector = CommandCollector::new(rx);

        assert_eq!(collector.collect_frame(), TickControl::Continue);
        assert!(collector.take_requests().is_empty());
    }

    #[test]
    fn collect_keeps_request_order() {
        let (tx, rx) = unbounded();
        let mut collector = CommandCollector::new(rx);

        tx.send(RuntimeCommand::LoadScene(LoadRequest::new("Level1"))).unwrap();
        tx.send(RuntimeCommand::LoadScene(LoadRequest::new("Level2"))).unwrap();

        assert_eq!(collector.collect_frame(), TickControl::Continue);
        let scenes: Vec<String> = collector.take_requests().into_iter().map(|r| r.scene).collect();
        assert_eq!(scenes, ["Level1", "Level2"]);
    }

    #[test]
    fn collect_returns_exit_on_shutdown() {
        let (tx, rx) = unbounded();
        let mut collector = CommandCollector::new(rx);

        tx.send(RuntimeCommand::Shutdown).unwrap();

        assert_eq!(collector.collect_frame(), TickControl::Exit);
    }

    #[test]
    fn collect_returns_exit_on_disconnect() {
        let (tx, rx) = unbounded::<RuntimeCommand>();
        let mut collector = CommandCollector::new(rx);

        drop(tx);

        assert_eq!(collector.collect_frame(), TickControl::Exit);
    }

    #[test]
    fn pace_buffers_commands_for_next_frame() {
        let (tx, rx) = unbounded();
        let mut collector = CommandCollector::new(rx);

        tx.send(RuntimeCommand::LoadScene(LoadRequest::new("Level1"))).unwrap();
        collector.pace(Instant::now() + Duration::from_millis(20));

        assert_eq!(collector.collect_frame(), TickControl::Continue);
        assert_eq!(collector.take_requests().len(), 1);
    }
}
