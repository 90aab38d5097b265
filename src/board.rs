use embassy_executor::{InterruptExecutor, SendSpawner};
use embassy_stm32::interrupt::{self, InterruptExt, Priority};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz;
use embassy_stm32::{Config, Peripherals};

/// STM32F405 at 168 MHz from the 8 MHz crystal, 48 MHz for USB.
///
/// Fixed by the controller board (8 MHz HSE, USB on PA11/PA12); revisit only with new hardware.
pub fn init() -> Peripherals {
    let mut config = Config::default();
    config.rcc.hse = Some(Hse {
        freq: Hertz(8_000_000),
        mode: HseMode::Oscillator,
    });
    config.rcc.pll_src = PllSource::HSE;
    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL168,
        divp: Some(PllPDiv::DIV2),
        divq: Some(PllQDiv::DIV7),
        divr: None,
    });
    config.rcc.sys = Sysclk::PLL1_P;
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    config.rcc.apb1_pre = APBPrescaler::DIV4;
    config.rcc.apb2_pre = APBPrescaler::DIV2;

    embassy_stm32::init(config)
}

fn nvic_priority(level: u8) -> Priority {
    match level {
        0 => Priority::P0,
        1 => Priority::P1,
        2 => Priority::P2,
        3 => Priority::P3,
        4 => Priority::P4,
        5 => Priority::P5,
        6 => Priority::P6,
        7 => Priority::P7,
        8 => Priority::P8,
        9 => Priority::P9,
        10 => Priority::P10,
        11 => Priority::P11,
        12 => Priority::P12,
        13 => Priority::P13,
        14 => Priority::P14,
        _ => Priority::P15,
    }
}

/// Start the command-reception executor on the spare UART5 vector at `level`, with the
/// USART6 driver interrupt at the same level. Anything spawned on it preempts every
/// thread-mode task.
pub fn start_command_executor(executor: &'static InterruptExecutor, level: u8) -> SendSpawner {
    let prio = nvic_priority(level);
    interrupt::USART6.set_priority(prio);
    interrupt::UART5.set_priority(prio);
    executor.start(interrupt::UART5)
}
