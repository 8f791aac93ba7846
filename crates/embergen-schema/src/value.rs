use std::fmt;

use derive_more::{From, TryInto};
use embergen_cpp::{Expression, Ident};
use indexmap::IndexMap;

use crate::lambda::LambdaSource;

/// An insertion-ordered map node of the configuration tree.
pub type Mapping = IndexMap<String, Value>;

/// A duration with the unit it was validated into. Code generation renders
/// it as a bare integer in that unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimePeriod {
    pub value: u64,
    pub unit: TimeUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeUnit {
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    /// Microseconds per unit.
    pub fn factor(&self) -> u64 {
        match self {
            TimeUnit::Microseconds => 1,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Seconds => 1_000_000,
            TimeUnit::Minutes => 60_000_000,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
        }
    }
}

impl TimePeriod {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        TimePeriod { value, unit }
    }

    pub fn from_microseconds(value: u64) -> Self {
        TimePeriod::new(value, TimeUnit::Microseconds)
    }

    pub fn total_microseconds(&self) -> u128 {
        self.value as u128 * self.unit.factor() as u128
    }

    /// Re-expresses the period in `unit`, or None when it would lose
    /// precision, e.g. 1500us cannot become milliseconds.
    pub fn as_unit(&self, unit: TimeUnit) -> Option<TimePeriod> {
        let total = self.total_microseconds();
        let factor = unit.factor() as u128;
        if total % factor != 0 {
            return None;
        }
        u64::try_from(total / factor)
            .ok()
            .map(|value| TimePeriod::new(value, unit))
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// A validated choice from an enum mapping: the configuration label plus the
/// C++ expression it stands for.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumValue {
    pub label: String,
    pub expression: Expression,
}

/// The canonical configuration tree. Parsers lower their documents into this
/// and validators rewrite it in place; code generation only ever sees values
/// that came out of a schema.
#[derive(Clone, Debug, PartialEq, From, TryInto)]
#[try_into(owned, ref, ref_mut)]
pub enum Value {
    #[from(ignore)]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    HexInt(u64),
    Bytes(Vec<u8>),
    TimePeriod(TimePeriod),
    Enum(EnumValue),
    Lambda(LambdaSource),
    Id(Ident),
    #[try_into(ignore)]
    List(Vec<Value>),
    #[try_into(ignore)]
    Mapping(Mapping),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time_period(&self) -> Option<&TimePeriod> {
        match self {
            Value::TimePeriod(tp) => Some(tp),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&LambdaSource> {
        match self {
            Value::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Mapping lookup sugar; None for missing keys and non-mappings.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// The name of this value's shape, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::HexInt(_) => "hex integer",
            Value::Bytes(_) => "bytes",
            Value::TimePeriod(_) => "time period",
            Value::Enum(_) => "enum value",
            Value::Lambda(_) => "lambda",
            Value::Id(_) => "identifier",
            Value::List(_) => "list",
            Value::Mapping(_) => "mapping",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
