//! RGB status LED driver.
//!
//! Three PWM channels (LEDC on the ESP32) drive discrete R/G/B LEDs or a
//! common-cathode RGB LED.  Each [`IndicatorSignal`] maps to one fixed
//! colour; channel errors are logged and swallowed so a broken LED never
//! stops the control loop.

use embedded_hal::pwm::SetDutyCycle;
use log::{debug, warn};

use crate::app::ports::{IndicatorSignal, StatusIndicator};

/// 24-bit colour, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }
}

pub const RED: Rgb = Rgb::from_hex(0xFF_00_00);
pub const ORANGE: Rgb = Rgb::from_hex(0xFF_D7_00);
pub const GREEN: Rgb = Rgb::from_hex(0x00_FF_00);
pub const WHITE: Rgb = Rgb::from_hex(0xFF_FF_FF);
pub const BLACK: Rgb = Rgb::from_hex(0x00_00_00);
pub const DIM_BLUE: Rgb = Rgb::from_hex(0x00_00_22);

/// Palette lookup.
pub const fn colour_for(signal: IndicatorSignal) -> Rgb {
    match signal {
        IndicatorSignal::NotOperational => RED,
        IndicatorSignal::PartiallyOperational => ORANGE,
        IndicatorSignal::Operational => GREEN,
        IndicatorSignal::CommandOn => WHITE,
        IndicatorSignal::CommandOff => BLACK,
        IndicatorSignal::Stopped => DIM_BLUE,
    }
}

pub struct StatusLed<R, G, B> {
    red: R,
    green: G,
    blue: B,
    current: Rgb,
}

impl<R, G, B> StatusLed<R, G, B>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
{
    /// Takes ownership of the three channels and blanks the LED.
    pub fn new(red: R, green: G, blue: B) -> Self {
        let mut led = Self {
            red,
            green,
            blue,
            current: BLACK,
        };
        led.set_colour(BLACK);
        led
    }

    fn set_colour(&mut self, colour: Rgb) {
        let Rgb(r, g, b) = colour;
        if self.red.set_duty_cycle_fraction(u16::from(r), 255).is_err() {
            warn!("status_led: red channel write failed");
        }
        if self.green.set_duty_cycle_fraction(u16::from(g), 255).is_err() {
            warn!("status_led: green channel write failed");
        }
        if self.blue.set_duty_cycle_fraction(u16::from(b), 255).is_err() {
            warn!("status_led: blue channel write failed");
        }
        self.current = colour;
    }

    pub fn current_colour(&self) -> Rgb {
        self.current
    }
}

impl<R, G, B> StatusIndicator for StatusLed<R, G, B>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
{
    fn show(&mut self, signal: IndicatorSignal) {
        debug!("status_led: {:?}", signal);
        self.set_colour(colour_for(signal));
    }
}
