#![no_std]
#![no_main]

use panic_halt as _;
use rp_pico::entry;

use embedded_hal::digital::v2::{OutputPin, PinState};
use rp_pico::hal::{
    self,
    fugit::RateExtU32,
    gpio::{FunctionPio0, FunctionPio1, FunctionUart, Pins, PullUp},
    pac,
    pio::PIOExt,
    uart::{DataBits, StopBits, UartConfig, UartPeripheral},
    Clock,
};
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;

use dinmux::config::{PORT_FAILURE_POLICY, PORT_PINS};
use dinmux::{Bridge, BusStatus, LifecycleMonitor, LogSink, PortBuffer, PortIndex, Ports, UsbEvent};

mod logger;
mod pio_uart;
mod usb_midi;

use pio_uart::{PioMidiUart, UartPrograms};
use usb_midi::UsbMidiClass;

const LOG_BAUD_RATE: u32 = 115_200;

#[entry]
fn start() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    // GPIO 23-25 carry MIDI OUT on this board, so the Pico pin names don't apply
    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let uart_pins = (
        pins.gpio0.into_function::<FunctionUart>(),
        pins.gpio1.into_function::<FunctionUart>(),
    );
    let uart = UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS)
        .enable(
            UartConfig::new(LOG_BAUD_RATE.Hz(), DataBits::Eight, None, StopBits::One),
            clocks.peripheral_clock.freq(),
        )
        .ok();
    logger::init(log::LevelFilter::Info);
    let flush_log = || {
        if let Some(uart) = &uart {
            logger::drain(|bytes| match uart.write_raw(bytes) {
                Ok(rest) => bytes.len() - rest.len(),
                Err(_) => 0,
            });
        }
    };
    log::info!("dinmux {} starting", env!("CARGO_PKG_VERSION"));

    // line drivers stay enabled for the life of the program
    let _tx_enable = (
        pins.gpio20.into_push_pull_output_in_state(PinState::High),
        pins.gpio19.into_push_pull_output_in_state(PinState::High),
        pins.gpio18.into_push_pull_output_in_state(PinState::High),
        pins.gpio21.into_push_pull_output_in_state(PinState::High),
    );
    // these follow PORT_PINS
    let _midi_out = (
        pins.gpio24.into_function::<FunctionPio0>(),
        pins.gpio25.into_function::<FunctionPio0>(),
        pins.gpio22.into_function::<FunctionPio0>(),
        pins.gpio23.into_function::<FunctionPio0>(),
    );
    let _midi_in = (
        pins.gpio8.into_function::<FunctionPio1>().into_pull_type::<PullUp>(),
        pins.gpio9.into_function::<FunctionPio1>().into_pull_type::<PullUp>(),
        pins.gpio10.into_function::<FunctionPio1>().into_pull_type::<PullUp>(),
        pins.gpio11.into_function::<FunctionPio1>().into_pull_type::<PullUp>(),
    );
    let mut led = pins.gpio15.into_push_pull_output();

    let (mut pio0, tx0, tx1, tx2, tx3) = pac.PIO0.split(&mut pac.RESETS);
    let (mut pio1, rx0, rx1, rx2, rx3) = pac.PIO1.split(&mut pac.RESETS);
    let programs = UartPrograms::install(&mut pio0, &mut pio1, clocks.system_clock.freq().to_Hz());
    let mut port_a = PioMidiUart::new(PortIndex::new(0), &programs, tx0, rx0, PORT_PINS[0]);
    let mut port_b = PioMidiUart::new(PortIndex::new(1), &programs, tx1, rx1, PORT_PINS[1]);
    let mut port_c = PioMidiUart::new(PortIndex::new(2), &programs, tx2, rx2, PORT_PINS[2]);
    let mut port_d = PioMidiUart::new(PortIndex::new(3), &programs, tx3, rx3, PORT_PINS[3]);
    let ports = Ports::from_results(
        PORT_FAILURE_POLICY,
        [
            port_a.as_mut().map(|p| p as &mut dyn PortBuffer).map_err(|e| *e),
            port_b.as_mut().map(|p| p as &mut dyn PortBuffer).map_err(|e| *e),
            port_c.as_mut().map(|p| p as &mut dyn PortBuffer).map_err(|e| *e),
            port_d.as_mut().map(|p| p as &mut dyn PortBuffer).map_err(|e| *e),
        ],
    );
    let ports = match ports {
        Ok(ports) => ports,
        Err(e) => {
            log::error!("Halting: {}", e);
            loop {
                flush_log();
            }
        }
    };

    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    ));
    let mut midi = UsbMidiClass::new(&usb_bus);
    let mut usb_dev = UsbDeviceBuilder::new(&usb_bus, UsbVidPid(0xCAFE, 0x4008))
        .manufacturer("dinmux")
        .product("dinmux 4x4 MIDI interface")
        .serial_number(env!("CARGO_PKG_VERSION"))
        .device_class(0x00)
        .build();

    let mut monitor = LifecycleMonitor::new();
    let mut bridge = Bridge::new(ports);
    log::info!("Ready");
    loop {
        usb_dev.poll(&mut [&mut midi]);
        let status = match usb_dev.state() {
            UsbDeviceState::Configured => BusStatus::Configured,
            UsbDeviceState::Suspend => BusStatus::Suspended,
            _ => BusStatus::Unconfigured,
        };
        if let Some(event) = monitor.observe(status) {
            match event {
                UsbEvent::Mounted => midi.set_configured(true),
                UsbEvent::Unmounted => midi.set_configured(false),
                UsbEvent::Suspended { .. } | UsbEvent::Resumed => {}
            }
            bridge.handle_event(event);
        }
        midi.service();

        let now_ms = (timer.get_counter().ticks() / 1_000) as u32;
        if let Some(level) = bridge.poll(&mut midi, &mut LogSink, now_ms) {
            let _ = led.set_state(level.into());
        }
        midi.service();
        flush_log();
    }
}
