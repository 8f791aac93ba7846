//! Configuration handling for embergen: the canonical value tree that parsed
//! documents are lowered into, the lambda source type, and the composable
//! validators that turn a raw tree into a typed one.

pub mod coerce;
pub mod conf;
pub mod errors;
pub mod lambda;
pub mod validate;
pub mod value;

pub use errors::{DocumentMap, DocumentRange, PathItem, ValidationError, ValidationErrors};
pub use lambda::LambdaSource;
pub use validate::{Context, Mcu, Schema, ValidateResult, Validator};
pub use value::{EnumValue, Mapping, TimePeriod, TimeUnit, Value};
