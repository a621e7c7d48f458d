//! Line configuration translator.
//!
//! Maps the abstract line parameters (baud rate, parity, stop bits, data bits,
//! open mode) onto termios control modes and open flags, and overlays a
//! [`LineConfiguration`] onto a [`Termios`].

use rustix::fs::OFlags;
use rustix::termios::{ControlModes, LocalModes, Termios};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;

/// Standard baud rates supported by the termios interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B0,
    B50,
    B75,
    B110,
    B134,
    B150,
    B200,
    B300,
    B600,
    B1200,
    B1800,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    /// Every supported rate, slowest first.
    pub const ALL: [BaudRate; 19] = [
        BaudRate::B0,
        BaudRate::B50,
        BaudRate::B75,
        BaudRate::B110,
        BaudRate::B134,
        BaudRate::B150,
        BaudRate::B200,
        BaudRate::B300,
        BaudRate::B600,
        BaudRate::B1200,
        BaudRate::B1800,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
    ];

    /// Nominal rate in bits per second.
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B0 => 0,
            BaudRate::B50 => 50,
            BaudRate::B75 => 75,
            BaudRate::B110 => 110,
            BaudRate::B134 => 134,
            BaudRate::B150 => 150,
            BaudRate::B200 => 200,
            BaudRate::B300 => 300,
            BaudRate::B600 => 600,
            BaudRate::B1200 => 1200,
            BaudRate::B1800 => 1800,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
            BaudRate::B230400 => 230400,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = UnsupportedBaudRate;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|rate| rate.bits_per_second() == value)
            .ok_or(UnsupportedBaudRate(value))
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.bits_per_second()
    }
}

impl FromStr for BaudRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid baud rate: {}", s.trim()))?;
        BaudRate::try_from(value).map_err(|e| e.to_string())
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

/// A requested rate outside the standard set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsupported baud rate: {0}")]
pub struct UnsupportedBaudRate(pub u32);

/// Parity checking modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    /// Control flags this parity sets; `None` sets nothing.
    pub fn flags(self) -> ControlModes {
        match self {
            Parity::None => ControlModes::empty(),
            Parity::Even => ControlModes::PARENB,
            Parity::Odd => ControlModes::PARENB | ControlModes::PARODD,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    pub fn flags(self) -> ControlModes {
        match self {
            StopBits::One => ControlModes::empty(),
            StopBits::Two => ControlModes::CSTOPB,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    /// Value for the `CSIZE` field.
    pub fn flags(self) -> ControlModes {
        match self {
            DataBits::Five => ControlModes::CS5,
            DataBits::Six => ControlModes::CS6,
            DataBits::Seven => ControlModes::CS7,
            DataBits::Eight => ControlModes::CS8,
        }
    }
}

/// Access mode requested when opening the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl OpenMode {
    /// Access flag only; see [`open_flags`] for the full set.
    pub fn flags(self) -> OFlags {
        match self {
            OpenMode::ReadOnly => OFlags::RDONLY,
            OpenMode::WriteOnly => OFlags::WRONLY,
            OpenMode::ReadWrite => OFlags::RDWR,
        }
    }
}

/// Flags passed to `open(2)` for a device opened in `mode`.
///
/// Always non-blocking, without acquiring a controlling terminal, and
/// close-on-exec.
pub fn open_flags(mode: OpenMode) -> OFlags {
    mode.flags() | OFlags::NOCTTY | OFlags::NONBLOCK | OFlags::CLOEXEC
}

macro_rules! keyword_from_str {
    ($ty:ty, $what:literal, { $($text:literal => $value:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($value),)+
                    other => Err(format!(concat!("invalid ", $what, ": {}"), other)),
                }
            }
        }
    };
}

keyword_from_str!(Parity, "parity", {
    "none" => Parity::None,
    "even" => Parity::Even,
    "odd" => Parity::Odd,
});
keyword_from_str!(StopBits, "stop bits", {
    "one" => StopBits::One, "1" => StopBits::One,
    "two" => StopBits::Two, "2" => StopBits::Two,
});
keyword_from_str!(DataBits, "data bits", {
    "five" => DataBits::Five, "5" => DataBits::Five,
    "six" => DataBits::Six, "6" => DataBits::Six,
    "seven" => DataBits::Seven, "7" => DataBits::Seven,
    "eight" => DataBits::Eight, "8" => DataBits::Eight,
});
keyword_from_str!(OpenMode, "open mode", {
    "read-only" => OpenMode::ReadOnly, "ro" => OpenMode::ReadOnly,
    "write-only" => OpenMode::WriteOnly, "wo" => OpenMode::WriteOnly,
    "read-write" => OpenMode::ReadWrite, "rw" => OpenMode::ReadWrite,
});

/// Line parameters applied to an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConfiguration {
    pub baud_rate: BaudRate,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
}

impl Default for LineConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::B9600,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: DataBits::Eight,
        }
    }
}

impl LineConfiguration {
    pub fn new(baud_rate: BaudRate) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Overlay these parameters onto `termios`.
    ///
    /// Raw-mode bits are not optional: canonical input, echo, echoed erase
    /// and signal generation are always cleared, the receiver and local
    /// mode are always enabled.
    pub fn apply_to(&self, termios: &mut Termios) -> io::Result<()> {
        termios.set_speed(self.baud_rate.bits_per_second())?;

        let modes = &mut termios.control_modes;
        modes.remove(ControlModes::PARENB | ControlModes::PARODD);
        modes.insert(self.parity.flags());

        modes.remove(ControlModes::CSTOPB);
        modes.insert(self.stop_bits.flags());

        modes.remove(ControlModes::CSIZE);
        modes.insert(self.data_bits.flags());

        modes.insert(ControlModes::CREAD | ControlModes::CLOCAL);
        termios
            .local_modes
            .remove(LocalModes::ICANON | LocalModes::ECHO | LocalModes::ECHOE | LocalModes::ISIG);

        Ok(())
    }
}

impl fmt::Display for LineConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        let data = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(f, "{} {}{}{}", self.baud_rate, data, parity, stop)
    }
}
