#![no_std]
#![no_main]

mod board;
mod usb;

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::peripherals::{DMA2_CH1, DMA2_CH6, USART6};
use embassy_stm32::usart::{Config as UsartConfig, RingBufferedUartRx, Uart, UartTx};
use embassy_stm32::{bind_interrupts, interrupt, peripherals};
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use rover_comm::config::{CommConfig, TaskId, COMMAND_QUEUE_DEPTH};
use rover_comm::context::CommContext;
use rover_comm::drivers::tlv::RecordType;
use rover_comm::drivers::transport::{Transport, TransportError};
use rover_comm::setup::{self, GpsProducer, MotorProducer, VelocityProducer};
use rover_comm::tasks::assembler::Assembler;
use rover_comm::tasks::command_rx::RxArm;
use rover_comm::tasks::datalog;
use rover_comm::tasks::dispatcher::Dispatcher;

use crate::usb::UsbConsole;

const CONFIG: CommConfig = CommConfig::DEFAULT;

static CONTEXT: StaticCell<CommContext> = StaticCell::new();
static RX_DMA_BUF: StaticCell<[u8; 32]> = StaticCell::new();

/// Command reception runs here, above every thread-mode task.
static COMMAND_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    USART6 => embassy_stm32::usart::InterruptHandler<peripherals::USART6>;
});

#[interrupt]
unsafe fn UART5() {
    COMMAND_EXECUTOR.on_interrupt()
}

// ── Serial link (USART6: TX=PC6, RX=PC7) ──────────────────────────────────────

struct TelemetryLink {
    tx: UartTx<'static, USART6, DMA2_CH6>,
}

impl Transport for TelemetryLink {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.tx.write(bytes).await.map_err(|_| TransportError::Io)
    }
}

/// Circular DMA keeps single-byte reception armed; nothing to restart per byte.
struct CircularDma;

impl RxArm for CircularDma {
    fn arm(&mut self) {}
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

#[embassy_executor::task]
async fn command_rx_task(ctx: &'static CommContext, mut rx: RingBufferedUartRx<'static, USART6, DMA2_CH1>) {
    let mut byte = [0u8; 1];
    let mut dma = CircularDma;
    loop {
        match rx.read(&mut byte).await {
            Ok(1) => {
                ctx.commands.on_receive_complete(byte[0], &mut dma);
            }
            Ok(_) => {}
            // The ring buffer overran or the line errored: bytes are gone. The next read
            // restarts reception.
            Err(e) => {
                defmt::warn!("command uart: {}", e);
                ctx.commands.record_overrun();
            }
        }
    }
}

#[embassy_executor::task]
async fn dispatcher_task(dispatcher: Dispatcher<'static, COMMAND_QUEUE_DEPTH>) {
    dispatcher.run().await
}

#[embassy_executor::task]
async fn motor_task(producer: MotorProducer<'static>, period: Duration) {
    producer.run(period).await
}

#[embassy_executor::task]
async fn velocity_task(producer: VelocityProducer<'static>, period: Duration) {
    producer.run(period).await
}

#[embassy_executor::task]
async fn gps_task(producer: GpsProducer<'static>, period: Duration) {
    producer.run(period).await
}

#[embassy_executor::task]
async fn assembler_task(assembler: Assembler<'static>, link: TelemetryLink, period: Duration) {
    assembler.run(link, period).await
}

#[embassy_executor::task]
async fn datalog_task(ctx: &'static CommContext, console: UsbConsole, period: Duration) {
    datalog::run(ctx, console, period).await
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = board::init();

    let ctx: &'static CommContext = CONTEXT.init(CommContext::new());
    let wiring = match setup::wire(ctx, &CONFIG) {
        Ok(w) => w,
        Err(e) => {
            defmt::error!("invalid comm configuration: {}", e);
            panic!("startup aborted");
        }
    };

    // USB CDC debug console
    let (usb_dev, console) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();

    // Telemetry / command UART @ 115200
    let mut uart_config = UsartConfig::default();
    uart_config.baudrate = 115_200;
    let uart = Uart::new(p.USART6, p.PC7, p.PC6, Irqs, p.DMA2_CH6, p.DMA2_CH1, uart_config).unwrap();
    let (uart_tx, uart_rx) = uart.split();
    let mut uart_rx = uart_rx.into_ring_buffered(RX_DMA_BUF.init([0; 32]));
    if let Err(e) = uart_rx.start() {
        defmt::error!("command uart start failed: {}", e);
        panic!("startup aborted");
    }
    let command_spawner = board::start_command_executor(&COMMAND_EXECUTOR, CONFIG.rx_irq_priority);
    command_spawner.spawn(command_rx_task(ctx, uart_rx)).unwrap();

    // Thread-mode tasks cooperate, so priority only sets spawn order here.
    let mut dispatcher = Some(wiring.dispatcher);
    let mut motor = Some(wiring.motor);
    let mut velocity = Some(wiring.velocity);
    let mut gps = Some(wiring.gps);
    let mut assembler = Some(wiring.assembler);
    let mut link = Some(TelemetryLink { tx: uart_tx });
    let mut console = Some(console);

    for id in CONFIG.spawn_order() {
        let spawned = match id {
            TaskId::Dispatcher => dispatcher.take().map(|d| spawner.spawn(dispatcher_task(d))),
            TaskId::Source(RecordType::Motor) => {
                motor.take().map(|m| spawner.spawn(motor_task(m, CONFIG.motor.task.period)))
            }
            TaskId::Source(RecordType::Velocity) => velocity
                .take()
                .map(|v| spawner.spawn(velocity_task(v, CONFIG.velocity.task.period))),
            TaskId::Source(RecordType::Gps) => {
                gps.take().map(|g| spawner.spawn(gps_task(g, CONFIG.gps.task.period)))
            }
            TaskId::Assembler => assembler
                .take()
                .zip(link.take())
                .map(|(a, l)| spawner.spawn(assembler_task(a, l, CONFIG.assembler.period))),
            TaskId::Datalog => console
                .take()
                .map(|c| spawner.spawn(datalog_task(ctx, c, CONFIG.datalog.period))),
        };
        if let Some(Err(_)) = spawned {
            defmt::error!("task pool exhausted spawning {}", id);
            panic!("startup aborted");
        }
    }
    defmt::info!("rover comm up, mode {}", ctx.mode.get());

    // Heartbeat LED (PC13) @ 1 Hz
    let mut led = Output::new(p.PC13, Level::High, Speed::Low);
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}
