/*!
Typed coercions. Each of these produces a [`Validator`](crate::Validator)
that accepts the lenient spellings a configuration author may use (strings
with unit suffixes, hex prefixes, percent signs) and rewrites them into the
one canonical [`Value`] variant downstream code generation expects.
*/

use embergen_cpp::Expression;
use indexmap::IndexMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ValidationErrors;
use crate::validate::Validator;
use crate::value::{EnumValue, TimePeriod, TimeUnit, Value};

fn type_error(expected: &str, value: &Value) -> ValidationErrors {
    if matches!(value, Value::Lambda(_)) {
        ValidationErrors::single("this option is not templatable")
    } else {
        ValidationErrors::single(format!("expected {expected}, got {}", value.type_name()))
    }
}

pub fn boolean() -> Validator {
    Validator::new(|value, _| match value {
        Value::Bool(_) => Ok(value),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "enable" => Ok(Value::Bool(true)),
            "false" | "no" | "off" | "disable" => Ok(Value::Bool(false)),
            _ => Err(ValidationErrors::single(format!(
                "cannot convert '{s}' to a boolean, please use 'true' or 'false'",
            ))),
        },
        other => Err(type_error("a boolean", &other)),
    })
}

pub fn int_() -> Validator {
    Validator::new(|value, _| match value {
        Value::Int(_) => Ok(value),
        Value::HexInt(h) => match i64::try_from(h) {
            Ok(i) => Ok(Value::Int(i)),
            Err(_) => Err(ValidationErrors::single(format!(
                "value {h:#x} does not fit in a signed integer",
            ))),
        },
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 2f64.powi(63) => {
            Ok(Value::Int(f as i64))
        }
        Value::Float(f) => Err(ValidationErrors::single(format!(
            "expected an integer, got the fractional number {f}",
        ))),
        Value::String(s) => {
            let trimmed = s.trim();
            let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => trimmed.parse(),
            };
            parsed.map(Value::Int).map_err(|_| {
                ValidationErrors::single(format!("cannot convert '{s}' to an integer"))
            })
        }
        other => Err(type_error("an integer", &other)),
    })
}

pub fn int_range(min: i64, max: i64) -> Validator {
    let base = int_();
    Validator::new(move |value, ctx| {
        let value = base.validate(value, ctx)?;
        match value.as_int() {
            Some(i) if i < min || i > max => Err(ValidationErrors::single(format!(
                "value {i} is out of range, expected {min} to {max}",
            ))),
            _ => Ok(value),
        }
    })
}

pub fn positive_int() -> Validator {
    let base = int_();
    Validator::new(move |value, ctx| {
        let value = base.validate(value, ctx)?;
        match value.as_int() {
            Some(i) if i < 0 => Err(ValidationErrors::single("value must not be negative")),
            _ => Ok(value),
        }
    })
}

pub fn positive_not_null_int() -> Validator {
    let base = int_();
    Validator::new(move |value, ctx| {
        let value = base.validate(value, ctx)?;
        match value.as_int() {
            Some(i) if i <= 0 => Err(ValidationErrors::single("value must be positive")),
            _ => Ok(value),
        }
    })
}

pub fn float_() -> Validator {
    Validator::new(|value, _| match value {
        Value::Float(_) => Ok(value),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::HexInt(h) => Ok(Value::Float(h as f64)),
        Value::String(s) => s.trim().parse().map(Value::Float).map_err(|_| {
            ValidationErrors::single(format!("cannot convert '{s}' to a number"))
        }),
        other => Err(type_error("a number", &other)),
    })
}

pub fn float_range(min: f64, max: f64) -> Validator {
    let base = float_();
    Validator::new(move |value, ctx| {
        let value = base.validate(value, ctx)?;
        match value.as_float() {
            Some(f) if f < min || f > max => Err(ValidationErrors::single(format!(
                "value {f} is out of range, expected {min} to {max}",
            ))),
            _ => Ok(value),
        }
    })
}

pub fn zero_to_one_float() -> Validator {
    float_range(0.0, 1.0)
}

/// A ratio, either as a plain number in `[0, 1]` or as a percent string
/// like `"75%"`.
pub fn percentage() -> Validator {
    let number = float_();
    Validator::new(move |value, ctx| {
        let value = match value {
            Value::String(s) => match s.strip_suffix('%') {
                Some(digits) => {
                    let f: f64 = digits.trim().parse().map_err(|_| {
                        ValidationErrors::single(format!(
                            "cannot convert '{s}' to a percentage"
                        ))
                    })?;
                    Value::Float(f / 100.0)
                }
                None => Value::String(s),
            },
            other => other,
        };
        let value = number.validate(value, ctx)?;
        match value.as_float() {
            Some(f) if !(0.0..=1.0).contains(&f) => Err(ValidationErrors::single(
                "percentage must be between 0% and 100%",
            )),
            _ => Ok(value),
        }
    })
}

pub fn string_() -> Validator {
    Validator::new(|value, _| match value {
        Value::String(_) => Ok(value),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        Value::HexInt(h) => Ok(Value::String(h.to_string())),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
            Ok(Value::String(format!("{f:.1}")))
        }
        Value::Float(f) => Ok(Value::String(f.to_string())),
        other => Err(type_error("a string", &other)),
    })
}

pub fn string_strict() -> Validator {
    Validator::new(|value, _| match value {
        Value::String(_) => Ok(value),
        other => Err(type_error("a string", &other)),
    })
}

static TIME_PERIOD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([-+]?[0-9]*\.?[0-9]+)\s*(us|ms|s|sec|min|h|d)$").unwrap());

fn parse_time_period(value: Value) -> Result<TimePeriod, ValidationErrors> {
    let source = match value {
        Value::TimePeriod(period) => return Ok(period),
        Value::String(s) => s,
        Value::Int(i) => {
            return Err(ValidationErrors::single(format!(
                "time periods need a unit, try '{i}ms'",
            )))
        }
        Value::Float(f) => {
            return Err(ValidationErrors::single(format!(
                "time periods need a unit, try '{f}s'",
            )))
        }
        other => return Err(type_error("a time period like '250ms'", &other)),
    };

    let Some(caps) = TIME_PERIOD_REGEX.captures(source.trim()) else {
        return Err(ValidationErrors::single(format!(
            "expected a time period like '250ms', got '{source}'",
        )));
    };
    let number: f64 = caps[1].parse().map_err(|_| {
        ValidationErrors::single(format!("cannot convert '{}' to a number", &caps[1]))
    })?;
    if number < 0.0 {
        return Err(ValidationErrors::single("time period must not be negative"));
    }
    let micros_per_unit: u64 = match &caps[2] {
        "us" => 1,
        "ms" => 1_000,
        "s" | "sec" => 1_000_000,
        "min" => 60_000_000,
        "h" => 3_600_000_000,
        "d" => 86_400_000_000,
        _ => unreachable!("units are fixed by the pattern"),
    };
    let micros = number * micros_per_unit as f64;
    if micros.fract() != 0.0 {
        return Err(ValidationErrors::single(
            "time period is too precise, the smallest unit is 1us",
        ));
    }

    // Store in the coarsest unit that divides evenly, so `5min` stays
    // minutes rather than becoming 300000000us.
    let base = TimePeriod::from_microseconds(micros as u64);
    for unit in [TimeUnit::Minutes, TimeUnit::Seconds, TimeUnit::Milliseconds] {
        if let Some(period) = base.as_unit(unit) {
            return Ok(period);
        }
    }
    Ok(base)
}

pub fn time_period() -> Validator {
    Validator::new(|value, _| parse_time_period(value).map(Value::TimePeriod))
}

fn time_period_in(unit: TimeUnit) -> Validator {
    Validator::new(move |value, _| {
        let period = parse_time_period(value)?;
        match period.as_unit(unit) {
            Some(converted) => Ok(Value::TimePeriod(converted)),
            None => Err(ValidationErrors::single(format!(
                "this option has a maximum precision of 1{}",
                unit.suffix()
            ))),
        }
    })
}

pub fn positive_time_period_microseconds() -> Validator {
    time_period_in(TimeUnit::Microseconds)
}

pub fn positive_time_period_milliseconds() -> Validator {
    time_period_in(TimeUnit::Milliseconds)
}

pub fn positive_time_period_seconds() -> Validator {
    time_period_in(TimeUnit::Seconds)
}

pub fn positive_time_period_minutes() -> Validator {
    time_period_in(TimeUnit::Minutes)
}

static FREQUENCY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]*\.?[0-9]+)\s*(?:([kMG])?Hz)?$").unwrap());

/// A frequency in hertz. Strings may carry `Hz`, `kHz`, `MHz` or `GHz`.
pub fn frequency() -> Validator {
    Validator::new(|value, _| {
        let hertz = match value {
            Value::Int(i) if i >= 0 => i as f64,
            Value::Float(f) if f >= 0.0 => f,
            Value::Int(_) | Value::Float(_) => {
                return Err(ValidationErrors::single("frequency must not be negative"))
            }
            Value::String(s) => {
                let Some(caps) = FREQUENCY_REGEX.captures(s.trim()) else {
                    return Err(ValidationErrors::single(format!(
                        "expected a frequency like '16MHz', got '{s}'",
                    )));
                };
                let number: f64 = caps[1].parse().map_err(|_| {
                    ValidationErrors::single(format!("cannot convert '{}' to a number", &caps[1]))
                })?;
                let multiplier = match caps.get(2).map(|m| m.as_str()) {
                    Some("k") => 1e3,
                    Some("M") => 1e6,
                    Some("G") => 1e9,
                    _ => 1.0,
                };
                number * multiplier
            }
            other => return Err(type_error("a frequency like '16MHz'", &other)),
        };
        Ok(Value::Float(hertz))
    })
}

static DISTANCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]*\.?[0-9]+)\s*(km|m|cm|mm)$").unwrap());

/// A distance in meters. Strings may carry `km`, `m`, `cm` or `mm`.
pub fn distance() -> Validator {
    Validator::new(|value, _| {
        let meters = match value {
            Value::Int(i) if i >= 0 => i as f64,
            Value::Float(f) if f >= 0.0 => f,
            Value::Int(_) | Value::Float(_) => {
                return Err(ValidationErrors::single("distance must not be negative"))
            }
            Value::String(s) => {
                let Some(caps) = DISTANCE_REGEX.captures(s.trim()) else {
                    return Err(ValidationErrors::single(format!(
                        "expected a distance like '2.5m', got '{s}'",
                    )));
                };
                let number: f64 = caps[1].parse().map_err(|_| {
                    ValidationErrors::single(format!("cannot convert '{}' to a number", &caps[1]))
                })?;
                let multiplier = match &caps[2] {
                    "km" => 1000.0,
                    "m" => 1.0,
                    "cm" => 0.01,
                    "mm" => 0.001,
                    _ => unreachable!("units are fixed by the pattern"),
                };
                number * multiplier
            }
            other => return Err(type_error("a distance like '2.5m'", &other)),
        };
        Ok(Value::Float(meters))
    })
}

/// A MAC address, `AA:BB:CC:DD:EE:FF`, canonicalized to six bytes.
pub fn mac_address() -> Validator {
    Validator::new(|value, _| {
        let Value::String(s) = &value else {
            return Err(type_error("a MAC address", &value));
        };
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ValidationErrors::single(
                "MAC address must consist of 6 colon-separated parts",
            ));
        }
        let mut bytes = Vec::with_capacity(6);
        for part in parts {
            let byte = u8::from_str_radix(part, 16).map_err(|_| {
                ValidationErrors::single(format!(
                    "MAC address part '{part}' is not a hexadecimal byte",
                ))
            })?;
            bytes.push(byte);
        }
        Ok(Value::Bytes(bytes))
    })
}

/// A dotted-quad IPv4 address, canonicalized to four bytes.
pub fn ipv4_address() -> Validator {
    Validator::new(|value, _| {
        let Value::String(s) = &value else {
            return Err(type_error("an IPv4 address", &value));
        };
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(ValidationErrors::single(
                "IPv4 address must consist of 4 dot-separated parts",
            ));
        }
        let mut bytes = Vec::with_capacity(4);
        for part in parts {
            let byte: u8 = part.parse().map_err(|_| {
                ValidationErrors::single(format!(
                    "IPv4 address part '{part}' is not a number between 0 and 255",
                ))
            })?;
            bytes.push(byte);
        }
        Ok(Value::Bytes(bytes))
    })
}

pub fn hex_int() -> Validator {
    Validator::new(|value, _| match value {
        Value::HexInt(_) => Ok(value),
        Value::Int(i) => match u64::try_from(i) {
            Ok(h) => Ok(Value::HexInt(h)),
            Err(_) => Err(ValidationErrors::single(
                "hexadecimal value must not be negative",
            )),
        },
        Value::String(s) => {
            let trimmed = s.trim();
            let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => trimmed.parse(),
            };
            parsed.map(Value::HexInt).map_err(|_| {
                ValidationErrors::single(format!("cannot convert '{s}' to a hexadecimal integer"))
            })
        }
        other => Err(type_error("a hexadecimal integer", &other)),
    })
}

pub fn hex_int_range(min: u64, max: u64) -> Validator {
    let base = hex_int();
    Validator::new(move |value, ctx| {
        let value = base.validate(value, ctx)?;
        match value {
            Value::HexInt(h) if h < min || h > max => Err(ValidationErrors::single(format!(
                "value {h:#x} is out of range, expected {min:#x} to {max:#x}",
            ))),
            _ => Ok(value),
        }
    })
}

/// Maps a closed set of labels to C++ expressions, as used for `mode:` style
/// options backed by a C++ enum.
pub fn enum_mapping(options: IndexMap<String, Expression>) -> Validator {
    Validator::new(move |value, _| {
        let Value::String(label) = &value else {
            return Err(type_error("an option name", &value));
        };
        match options.get(label) {
            Some(expression) => Ok(Value::Enum(EnumValue {
                label: label.clone(),
                expression: expression.clone(),
            })),
            None => Err(ValidationErrors::single(format!(
                "unknown value '{label}', valid values are {}",
                options.keys().join(", ")
            ))),
        }
    })
}
