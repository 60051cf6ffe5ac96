/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Units of measurement
pub mod unit {
    use std::{fmt, str::FromStr};

    /// Byte units
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ByteUnit {
        /// 1 byte
        Byte,
        /// 2<sup>10</sup> bytes.
        Kibibyte,
        /// 125 * 10<sup>3</sup> bytes.
        Megabit,
        /// 2<sup>20</sup> bytes.
        Mebibyte,
        /// 2<sup>30</sup> bytes.
        Gibibyte,
    }

    impl ByteUnit {
        /// Convert some number of bytes into this unit as an `f64`
        pub fn convert(&self, bytes: u64) -> f64 {
            bytes as f64 / self.as_bytes_u64() as f64
        }

        /// Figure out the best unit to display the given number of bytes in
        pub fn display(total_bytes: u64) -> ByteCountDisplayContext {
            let unit = [ByteUnit::Gibibyte, ByteUnit::Mebibyte, ByteUnit::Kibibyte]
                .into_iter()
                .find(|u| total_bytes >= u.as_bytes_u64())
                .unwrap_or(ByteUnit::Byte);
            ByteCountDisplayContext::new(total_bytes, unit)
        }

        /// The number of bytes represented by this unit
        pub const fn as_bytes_u64(&self) -> u64 {
            match self {
                ByteUnit::Byte => 1,
                ByteUnit::Kibibyte => 1 << 10,
                ByteUnit::Megabit => 125_000,
                ByteUnit::Mebibyte => 1 << 20,
                ByteUnit::Gibibyte => 1 << 30,
            }
        }

        pub(crate) const fn as_str(&self) -> &'static str {
            match self {
                ByteUnit::Byte => "B",
                ByteUnit::Kibibyte => "KiB",
                ByteUnit::Megabit => "Mb",
                ByteUnit::Mebibyte => "MiB",
                ByteUnit::Gibibyte => "GiB",
            }
        }
    }

    impl FromStr for ByteUnit {
        type Err = crate::error::Error;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let unit = match s {
                "B" => ByteUnit::Byte,
                "KiB" => ByteUnit::Kibibyte,
                "Mb" => ByteUnit::Megabit,
                "MiB" => ByteUnit::Mebibyte,
                "GiB" => ByteUnit::Gibibyte,
                _ => {
                    return Err(crate::error::invalid_input(format!(
                        "unknown byte unit '{}'",
                        s
                    )))
                }
            };

            Ok(unit)
        }
    }

    /// Display context to format a number of bytes in a particular unit
    #[derive(Debug)]
    pub struct ByteCountDisplayContext {
        /// The number of bytes to display
        pub total_bytes: u64,
        /// The unit to display the bytes as
        pub unit: ByteUnit,
    }

    impl ByteCountDisplayContext {
        /// Create a new display context for the number of bytes in a specific unit
        pub fn new(total_bytes: u64, unit: ByteUnit) -> Self {
            Self { total_bytes, unit }
        }
    }

    impl fmt::Display for ByteCountDisplayContext {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.total_bytes % self.unit.as_bytes_u64() == 0 {
                let converted = self.total_bytes / self.unit.as_bytes_u64();
                return write!(f, "{converted} {}", self.unit.as_str());
            }
            let precision = f.precision().unwrap_or(3);
            write!(
                f,
                "{1:.*} {2:}",
                precision,
                self.unit.convert(self.total_bytes),
                self.unit.as_str()
            )
        }
    }
}

/// Bytes transferred over some duration, used to express bandwidth ceilings
#[derive(Debug, Clone, Copy)]
pub struct Throughput {
    bytes_transferred: u64,
    elapsed: Duration,
}

impl Throughput {
    /// Create a new throughput measurement with the given bytes and time elapsed
    pub const fn new(bytes_transferred: u64, elapsed: Duration) -> Throughput {
        Throughput {
            bytes_transferred,
            elapsed,
        }
    }

    /// Create a new throughput measurement assuming a one second duration
    pub const fn new_bytes_per_sec(bytes_transferred: u64) -> Throughput {
        Self::new(bytes_transferred, Duration::from_secs(1))
    }

    /// Convert this throughput into a specific unit per second
    pub fn as_unit_per_sec(&self, unit: unit::ByteUnit) -> f64 {
        (self.bytes_transferred as f64 / unit.as_bytes_u64() as f64) / self.elapsed.as_secs_f64()
    }

    /// Convert this throughput into bytes / sec
    pub fn as_bytes_per_sec(&self) -> f64 {
        self.as_unit_per_sec(unit::ByteUnit::Byte)
    }
}

impl PartialEq for Throughput {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes_per_sec() == other.as_bytes_per_sec()
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes_per_sec = self.as_bytes_per_sec().round() as u64;
        write!(f, "{}/s", unit::ByteUnit::display(bytes_per_sec))
    }
}

/// Parses `"<count>"` (bytes per second) or `"<count> <unit>/s"`, e.g. `"8 MiB/s"`.
impl FromStr for Throughput {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (count, unit) = match s.strip_suffix("/s") {
            Some(rate) => {
                let rate = rate.trim();
                let split = rate
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rate.len());
                let (count, unit) = rate.split_at(split);
                (count, unit.trim().parse::<unit::ByteUnit>()?)
            }
            None => (s, unit::ByteUnit::Byte),
        };
        let count: u64 = count
            .parse()
            .map_err(|_| crate::error::invalid_input(format!("invalid throughput '{s}'")))?;
        Ok(Throughput::new_bytes_per_sec(count * unit.as_bytes_u64()))
    }
}
