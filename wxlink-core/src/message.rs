//! Fixed key/value schema shared with the watch face firmware.
//!
//! The firmware reads the scalar slots as 4-byte integers and displays them as 16-bit values,
//! and expects `SUNRISE_SUNSET` to be a byte array of exactly [`SUN_TIMES_LEN`] entries. Any
//! change here needs a matching firmware release.

use std::fmt::Write;

use crate::model::{ClockTime, NormalizedWeather};

/// Number of bytes in the `SUNRISE_SUNSET` slot.
pub const SUN_TIMES_LEN: usize = 6;

/// Inbox buffer the watch face opens for incoming messages.
pub const DEVICE_INBOX_SIZE: usize = 128;

const TUPLE_HEADER_LEN: usize = 7;
const TUPLE_TYPE_BYTE_ARRAY: u8 = 0;
const TUPLE_TYPE_INT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    SurfacePressure,
    Temperature,
    ApparentTemperature,
    SunriseSunset,
    Reserved0,
    Reserved1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Int32,
    Bytes(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub slot: Slot,
    pub name: &'static str,
    pub key: u32,
    pub kind: SlotKind,
}

/// Message keys in declaration order, numbered from 10000 like the watch app's `messageKeys`.
/// Reserved slots are never sent until they carry a value; the firmware logs unknown keys.
pub static SCHEMA: [SlotSpec; 6] = [
    SlotSpec { slot: Slot::SurfacePressure, name: "SURFACE_PRESSURE", key: 10000, kind: SlotKind::Int32 },
    SlotSpec { slot: Slot::Temperature, name: "TEMPERATURE", key: 10001, kind: SlotKind::Int32 },
    SlotSpec { slot: Slot::ApparentTemperature, name: "APPARENT_TEMPERATURE", key: 10002, kind: SlotKind::Int32 },
    SlotSpec { slot: Slot::SunriseSunset, name: "SUNRISE_SUNSET", key: 10003, kind: SlotKind::Bytes(SUN_TIMES_LEN) },
    SlotSpec { slot: Slot::Reserved0, name: "RESERVED_0", key: 10004, kind: SlotKind::Int32 },
    SlotSpec { slot: Slot::Reserved1, name: "RESERVED_1", key: 10005, kind: SlotKind::Int32 },
];

impl Slot {
    pub fn spec(&self) -> &'static SlotSpec {
        match self {
            Slot::SurfacePressure => &SCHEMA[0],
            Slot::Temperature => &SCHEMA[1],
            Slot::ApparentTemperature => &SCHEMA[2],
            Slot::SunriseSunset => &SCHEMA[3],
            Slot::Reserved0 => &SCHEMA[4],
            Slot::Reserved1 => &SCHEMA[5],
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleValue {
    Int(i32),
    Bytes([u8; SUN_TIMES_LEN]),
}

/// One message for the watch face. Built fresh per run by [`encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMessage {
    surface_pressure: i16,
    temperature: i16,
    apparent_temperature: i16,
    sun_times: [u8; SUN_TIMES_LEN],
}

impl DeviceMessage {
    pub fn surface_pressure(&self) -> i16 {
        self.surface_pressure
    }

    pub fn temperature(&self) -> i16 {
        self.temperature
    }

    pub fn apparent_temperature(&self) -> i16 {
        self.apparent_temperature
    }

    /// `[sunrise_h, sunrise_m, sunset_h, sunset_m, next_sunrise_h, next_sunrise_m]`
    pub fn sun_times(&self) -> [u8; SUN_TIMES_LEN] {
        self.sun_times
    }

    /// Assigned slots in schema order.
    pub fn tuples(&self) -> [(&'static SlotSpec, TupleValue); 4] {
        [
            (Slot::SurfacePressure.spec(), TupleValue::Int(self.surface_pressure.into())),
            (Slot::Temperature.spec(), TupleValue::Int(self.temperature.into())),
            (Slot::ApparentTemperature.spec(), TupleValue::Int(self.apparent_temperature.into())),
            (Slot::SunriseSunset.spec(), TupleValue::Bytes(self.sun_times)),
        ]
    }

    /// Size of [`DeviceMessage::to_bytes`] output.
    pub fn encoded_len(&self) -> usize {
        1 + self
            .tuples()
            .iter()
            .map(|(_, value)| TUPLE_HEADER_LEN + value_len(value))
            .sum::<usize>()
    }

    /// Dictionary wire format: tuple count, then per tuple a little-endian `u32` key,
    /// a type byte, a little-endian `u16` length and the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let tuples = self.tuples();
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(tuples.len() as u8);

        for (spec, value) in &tuples {
            out.extend_from_slice(&spec.key.to_le_bytes());
            match value {
                TupleValue::Int(v) => {
                    out.push(TUPLE_TYPE_INT);
                    out.extend_from_slice(&4u16.to_le_bytes());
                    out.extend_from_slice(&v.to_le_bytes());
                }
                TupleValue::Bytes(bytes) => {
                    out.push(TUPLE_TYPE_BYTE_ARRAY);
                    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                    out.extend_from_slice(bytes);
                }
            }
        }

        out
    }

    pub fn to_hex(&self) -> String {
        self.to_bytes().iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// Slot-name keyed JSON object, the form a JavaScript companion would hand to the watch.
    pub fn to_dictionary(&self) -> serde_json::Value {
        let entries = self.tuples().into_iter().map(|(spec, value)| {
            let value = match value {
                TupleValue::Int(v) => serde_json::json!(v),
                TupleValue::Bytes(bytes) => serde_json::json!(bytes),
            };
            (spec.name.to_string(), value)
        });

        serde_json::Value::Object(entries.collect())
    }
}

fn value_len(value: &TupleValue) -> usize {
    match value {
        TupleValue::Int(_) => 4,
        TupleValue::Bytes(bytes) => bytes.len(),
    }
}

/// Map normalized weather onto the device schema.
///
/// # Panics
///
/// If a scalar does not fit in an `i16` or a time component is out of range. The normalizer
/// rejects such payloads, so reaching this is a bug, not bad input.
pub fn encode(weather: &NormalizedWeather) -> DeviceMessage {
    DeviceMessage {
        surface_pressure: device_int(Slot::SurfacePressure, weather.surface_pressure),
        temperature: device_int(Slot::Temperature, weather.temperature),
        apparent_temperature: device_int(Slot::ApparentTemperature, weather.apparent_temperature),
        sun_times: sun_times(weather),
    }
}

fn device_int(slot: Slot, value: i32) -> i16 {
    i16::try_from(value).unwrap_or_else(|_| {
        panic!("{} = {value} does not fit the device's 16-bit width", slot.name())
    })
}

fn sun_times(weather: &NormalizedWeather) -> [u8; SUN_TIMES_LEN] {
    let times = [weather.sunrise, weather.sunset, weather.next_sunrise];
    for ClockTime { hour, minute } in times {
        assert!(hour <= 23 && minute <= 59, "invalid clock time {hour}:{minute}");
    }

    [
        weather.sunrise.hour,
        weather.sunrise.minute,
        weather.sunset.hour,
        weather.sunset.minute,
        weather.next_sunrise.hour,
        weather.next_sunrise.minute,
    ]
}
