use rover_comm::context::CommContext;
use rover_comm::state::{Command, Mode};
use rover_comm::tasks::command_rx::{RxArm, RxOutcome};
use rover_comm::tasks::dispatcher::Dispatcher;

#[derive(Default)]
struct UartStub {
    armed: usize,
}

impl RxArm for UartStub {
    fn arm(&mut self) {
        self.armed += 1;
    }
}

#[test]
fn sixth_command_before_dispatch_is_dropped_and_counted() {
    let ctx = CommContext::new();
    let mut uart = UartStub::default();

    let bytes = [1u8, 2, 0, 1, 2, 1];
    let outcomes: Vec<RxOutcome> =
        bytes.iter().map(|&b| ctx.commands.on_receive_complete(b, &mut uart)).collect();

    assert_eq!(outcomes.iter().filter(|o| o.enqueued).count(), 5);
    assert_eq!(outcomes[5], RxOutcome { command: Command::EnterAutonomous, enqueued: false, woke_dispatcher: false });
    assert_eq!(uart.armed, bytes.len());

    let stats = ctx.commands.stats();
    assert_eq!((stats.received, stats.dropped, stats.queued), (6, 1, 5));

    // The dispatcher sees the first five, in arrival order.
    let mut dispatcher = Dispatcher::new(&ctx.commands, &ctx.mode);
    let mut modes = Vec::new();
    while let Some(cmd) = ctx.commands.try_next() {
        modes.push(dispatcher.apply(cmd));
    }
    assert_eq!(modes, [Mode::Autonomous, Mode::Manual, Mode::Reset, Mode::Autonomous, Mode::Manual]);
    assert_eq!(ctx.mode.get(), Mode::Manual);
}

#[test]
fn space_freed_by_dispatcher_accepts_new_commands() {
    let ctx = CommContext::new();
    let mut uart = UartStub::default();
    for _ in 0..5 {
        assert!(ctx.commands.on_receive_complete(2, &mut uart).enqueued);
    }
    assert!(!ctx.commands.on_receive_complete(1, &mut uart).enqueued);

    let mut dispatcher = Dispatcher::new(&ctx.commands, &ctx.mode);
    let cmd = embassy_futures::block_on(ctx.commands.next_command());
    dispatcher.apply(cmd);

    assert!(ctx.commands.on_receive_complete(1, &mut uart).enqueued);
    assert_eq!(ctx.commands.stats().dropped, 1);
}
