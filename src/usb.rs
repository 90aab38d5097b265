use embassy_stm32::usb_otg::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

use rover_comm::drivers::transport::{Transport, TransportError};

bind_interrupts!(pub struct Irqs {
    OTG_FS => usb_otg::InterruptHandler<peripherals::USB_OTG_FS>;
});

pub type UsbDriver = Driver<'static, peripherals::USB_OTG_FS>;

const MAX_PACKET: usize = 64;

struct UsbBuffers {
    config_desc: [u8; 256],
    bos_desc: [u8; 256],
    control_buf: [u8; 64],
    ep_out: [u8; 256],
}

static BUFFERS: StaticCell<UsbBuffers> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

/// CDC-ACM debug console. Writes are dropped while no host holds the port open.
pub struct UsbConsole {
    class: CdcAcmClass<'static, UsbDriver>,
}

impl Transport for UsbConsole {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.class.dtr() {
            return Err(TransportError::NotReady);
        }
        for chunk in bytes.chunks(MAX_PACKET) {
            self.class.write_packet(chunk).await.map_err(|_| TransportError::Io)?;
        }
        // A full-size final packet needs a ZLP to end the transfer.
        if bytes.len() % MAX_PACKET == 0 {
            self.class.write_packet(&[]).await.map_err(|_| TransportError::Io)?;
        }
        Ok(())
    }
}

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

pub fn init(
    usb_periph: peripherals::USB_OTG_FS,
    pa12: peripherals::PA12,
    pa11: peripherals::PA11,
) -> (UsbDevice<'static, UsbDriver>, UsbConsole) {
    let bufs = BUFFERS.init(UsbBuffers {
        config_desc: [0; 256],
        bos_desc: [0; 256],
        control_buf: [0; 64],
        ep_out: [0; 256],
    });

    let mut usb_config = usb_otg::Config::default();
    usb_config.vbus_detection = false;
    let driver = Driver::new_fs(usb_periph, Irqs, pa12, pa11, &mut bufs.ep_out, usb_config);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("Rover");
    config.product = Some("Rover telemetry console");
    config.serial_number = Some("00000001");

    let mut builder = Builder::new(
        driver,
        config,
        &mut bufs.config_desc,
        &mut bufs.bos_desc,
        &mut [], // msos_descs
        &mut bufs.control_buf,
    );
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), MAX_PACKET as u16);
    let usb = builder.build();

    (usb, UsbConsole { class })
}
