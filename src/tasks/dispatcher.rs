use crate::state::{Command, Mode, ModeCell};
use crate::tasks::command_rx::CommandChannel;

/// Mode dispatcher. The only writer of the mode cell.
pub struct Dispatcher<'a, const N: usize> {
    commands: &'a CommandChannel<N>,
    mode: &'a ModeCell,
    unknown: u32,
}

impl<'a, const N: usize> Dispatcher<'a, N> {
    pub fn new(commands: &'a CommandChannel<N>, mode: &'a ModeCell) -> Self {
        Self { commands, mode, unknown: 0 }
    }

    /// Commands outside the defined set seen so far.
    pub fn unknown_commands(&self) -> u32 {
        self.unknown
    }

    /// Apply one command and return the resulting mode.
    pub fn apply(&mut self, cmd: Command) -> Mode {
        let current = self.mode.get();
        let next = current.on_command(cmd);
        if let Command::Unknown(raw) = cmd {
            self.unknown = self.unknown.wrapping_add(1);
            debug!("ignoring unknown command byte {}", raw);
        }
        if next != current {
            info!("mode {:?} -> {:?}", current, next);
            self.mode.set(next);
        }
        next
    }

    pub async fn run(mut self) -> ! {
        loop {
            let cmd = self.commands.next_command().await;
            self.apply(cmd);
        }
    }
}
