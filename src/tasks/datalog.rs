//! Human-readable status on the debug console, once per datalog period.
use core::fmt::Write;

use embassy_time::{Duration, Instant, Ticker};

use crate::context::CommContext;
use crate::drivers::tlv::RecordType;
use crate::drivers::transport::Transport;
use crate::queue::QueueStats;
use crate::state::Snapshot;

/// Two decimal places in an i16.
pub const SCALE_FACTOR: f32 = 100.0;

/// Saturates outside ±327.67.
pub fn float_to_fixed(value: f32) -> i16 {
    (value * SCALE_FACTOR) as i16
}

pub fn fixed_to_float(value: i16) -> f32 {
    value as f32 / SCALE_FACTOR
}

pub fn log_line(uptime_ms: u64) -> heapless::String<32> {
    let mut m = heapless::String::new();
    let _ = writeln!(m, "LOG:Tempo={}", uptime_ms);
    m
}

/// `$VEL:..,COR:..,POSX:..,POSY:..,ORI:..#` with fixed-point fields.
pub fn summary_line(s: &Snapshot) -> heapless::String<80> {
    let mut m = heapless::String::new();
    let _ = writeln!(
        m,
        "$VEL:{},COR:{},POSX:{},POSY:{},ORI:{}#",
        float_to_fixed(s.speed),
        float_to_fixed(s.motor_current),
        float_to_fixed(s.pos_x),
        float_to_fixed(s.pos_y),
        float_to_fixed(s.heading),
    );
    m
}

/// Samples that never reached a frame. Wraps like the atomics it is read from.
pub fn lost_samples(stats: impl Iterator<Item = QueueStats>) -> u32 {
    stats.fold(0u32, |acc, q| acc.wrapping_add(q.overwritten).wrapping_add(q.rejected))
}

pub fn counters_line(ctx: &CommContext) -> heapless::String<128> {
    let cmd = ctx.commands.stats();
    let tx = ctx.tx.stats();
    let lost = lost_samples(RecordType::ALL.iter().map(|&k| ctx.queue_stats(k)));

    let mut m = heapless::String::new();
    let _ = writeln!(
        m,
        "CNT:mode={:?},cmd={}/{},tx={}/{},lost={}",
        ctx.mode.get(),
        cmd.received,
        cmd.dropped,
        tx.frames_sent,
        tx.send_failures,
        lost,
    );
    m
}

pub async fn run<T: Transport>(ctx: &CommContext, mut console: T, period: Duration) -> ! {
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        // Console failures only cost a status line.
        let _ = console.send(log_line(Instant::now().as_millis()).as_bytes()).await;
        let _ = console.send(summary_line(&ctx.snapshot()).as_bytes()).await;
        let _ = console.send(counters_line(ctx).as_bytes()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_keeps_two_decimals() {
        assert_eq!(float_to_fixed(1.5), 150);
        assert_eq!(float_to_fixed(-0.25), -25);
        assert_eq!(fixed_to_float(150), 1.5);
        assert_eq!(float_to_fixed(1000.0), i16::MAX);
    }

    #[test]
    fn text_lines_match_console_format() {
        assert_eq!(log_line(1234).as_str(), "LOG:Tempo=1234\n");

        let snap = Snapshot { speed: 3.0, motor_current: 0.5, pos_x: 1.25, pos_y: -2.0, heading: 0.05 };
        assert_eq!(summary_line(&snap).as_str(), "$VEL:300,COR:50,POSX:125,POSY:-200,ORI:5#\n");
    }

    #[test]
    fn lost_count_wraps_instead_of_overflowing() {
        let evicting = QueueStats { overwritten: u32::MAX, ..Default::default() };
        let rejecting = QueueStats { rejected: 3, ..Default::default() };
        assert_eq!(lost_samples([evicting, rejecting].into_iter()), 2);
        assert_eq!(lost_samples([rejecting, rejecting].into_iter()), 6);
    }

    #[test]
    fn counters_line_reports_mode_and_drops() {
        let ctx = CommContext::new();
        struct NoArm;
        impl crate::tasks::command_rx::RxArm for NoArm {
            fn arm(&mut self) {}
        }
        for _ in 0..6 {
            ctx.commands.on_receive_complete(1, &mut NoArm);
        }
        assert_eq!(counters_line(&ctx).as_str(), "CNT:mode=Reset,cmd=6/1,tx=0/0,lost=0\n");
    }
}
