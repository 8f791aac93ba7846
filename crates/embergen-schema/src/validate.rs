use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use embergen_cpp::{Ident, MockObjClass};
use indexmap::IndexMap;
use itertools::Itertools;

use crate::conf::CONF_ID;
use crate::errors::{PathItem, ValidationError, ValidationErrors};
use crate::lambda::LambdaSource;
use crate::value::{Mapping, Value};

/// The MCU family generation is targeting. Validators use it to reject
/// options a platform cannot support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mcu {
    Esp32,
    Esp8266,
    Rp2040,
    Host,
}

impl Mcu {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mcu::Esp32 => "esp32",
            Mcu::Esp8266 => "esp8266",
            Mcu::Rp2040 => "rp2040",
            Mcu::Host => "host",
        }
    }
}

impl fmt::Display for Mcu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mcu {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "esp32" => Ok(Mcu::Esp32),
            "esp8266" => Ok(Mcu::Esp8266),
            "rp2040" => Ok(Mcu::Rp2040),
            "host" => Ok(Mcu::Host),
            other => Err(format!("unknown MCU family '{other}'")),
        }
    }
}

/// Ambient facts validation can consult.
#[derive(Clone, Debug)]
pub struct Context {
    pub mcu: Mcu,
    /// The toolchain the firmware builds with, e.g. "arduino". Unset in
    /// contexts that validate fragments without a concrete target.
    pub toolchain: Option<String>,
}

impl Context {
    pub fn new(mcu: Mcu) -> Self {
        Context {
            mcu,
            toolchain: None,
        }
    }

    pub fn with_toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.toolchain = Some(toolchain.into());
        self
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(Mcu::Host)
    }
}

pub type ValidateResult = Result<Value, ValidationErrors>;

/// A composable validation step. Validators take the value, and either give
/// back a (possibly rewritten) value or the list of problems found.
#[derive(Clone)]
pub struct Validator {
    f: Rc<dyn Fn(Value, &Context) -> ValidateResult>,
}

impl Validator {
    pub fn new(f: impl Fn(Value, &Context) -> ValidateResult + 'static) -> Self {
        Validator { f: Rc::new(f) }
    }

    pub fn validate(&self, value: Value, ctx: &Context) -> ValidateResult {
        (self.f)(value, ctx)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

impl From<Schema> for Validator {
    fn from(schema: Schema) -> Self {
        Validator::new(move |value, ctx| schema.validate(value, ctx))
    }
}

#[derive(Clone)]
enum Requirement {
    Required,
    Optional(Option<Rc<dyn Fn() -> Value>>),
}

#[derive(Clone)]
struct SchemaKey {
    validator: Validator,
    requirement: Requirement,
}

/// A mapping schema: an ordered table of keys, each with its own validator
/// and requirement. Unknown keys are rejected unless the schema was marked
/// extensible.
#[derive(Clone, Default)]
pub struct Schema {
    keys: IndexMap<String, SchemaKey>,
    extensible: bool,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn required(mut self, key: impl Into<String>, validator: Validator) -> Self {
        self.keys.insert(
            key.into(),
            SchemaKey {
                validator,
                requirement: Requirement::Required,
            },
        );
        self
    }

    pub fn optional(mut self, key: impl Into<String>, validator: Validator) -> Self {
        self.keys.insert(
            key.into(),
            SchemaKey {
                validator,
                requirement: Requirement::Optional(None),
            },
        );
        self
    }

    /// Optional key that is filled in (and then validated) when absent.
    pub fn optional_with_default(
        mut self,
        key: impl Into<String>,
        validator: Validator,
        default: impl Fn() -> Value + 'static,
    ) -> Self {
        self.keys.insert(
            key.into(),
            SchemaKey {
                validator,
                requirement: Requirement::Optional(Some(Rc::new(default))),
            },
        );
        self
    }

    /// Adds the `id` key as an optional declaration of `class`. When the
    /// user does not name one, an anonymous identifier is declared in its
    /// place and named later.
    pub fn generate_id(self, class: MockObjClass) -> Self {
        self.optional_with_default(CONF_ID, declare_id(class), || Value::None)
    }

    /// Allows keys this schema does not know about to pass through.
    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }

    /// A new schema with `other`'s keys layered on top of this one's.
    pub fn extend(mut self, other: &Schema) -> Self {
        for (key, schema_key) in &other.keys {
            self.keys.insert(key.clone(), schema_key.clone());
        }
        self.extensible |= other.extensible;
        self
    }

    pub fn validate(&self, value: Value, ctx: &Context) -> ValidateResult {
        let Value::Mapping(map) = value else {
            return Err(ValidationErrors::single(format!(
                "expected a mapping, got {}",
                value.type_name()
            )));
        };

        let mut out = Mapping::new();
        let mut errors = ValidationErrors::default();

        for (key, item) in map {
            let Some(schema_key) = self.keys.get(&key) else {
                if self.extensible {
                    out.insert(key, item);
                } else {
                    errors.push(
                        ValidationError::new("extra keys not allowed")
                            .prefixed(PathItem::Key(key)),
                    );
                }
                continue;
            };
            match schema_key.validator.validate(item, ctx) {
                Ok(validated) => {
                    out.insert(key, validated);
                }
                Err(errs) => errors.extend(errs.prefixed(PathItem::Key(key))),
            }
        }

        for (key, schema_key) in &self.keys {
            if out.contains_key(key) {
                continue;
            }
            match &schema_key.requirement {
                Requirement::Required => {
                    errors.push(
                        ValidationError::new("required key not provided")
                            .prefixed(PathItem::key(key)),
                    );
                }
                Requirement::Optional(Some(default)) => {
                    match schema_key.validator.validate(default(), ctx) {
                        Ok(validated) => {
                            out.insert(key.clone(), validated);
                        }
                        Err(errs) => errors.extend(errs.prefixed(PathItem::key(key))),
                    }
                }
                Requirement::Optional(None) => {}
            }
        }

        errors.into_result().map(|()| Value::Mapping(out))
    }
}

/// Applies each validator in order, feeding the output of one into the next.
pub fn all(validators: Vec<Validator>) -> Validator {
    Validator::new(move |mut value, ctx| {
        for validator in &validators {
            value = validator.validate(value, ctx)?;
        }
        Ok(value)
    })
}

/// Accepts the first validator that accepts the value.
pub fn any(validators: Vec<Validator>) -> Validator {
    Validator::new(move |value, ctx| {
        let mut messages = Vec::new();
        for validator in &validators {
            match validator.validate(value.clone(), ctx) {
                Ok(validated) => return Ok(validated),
                Err(errs) => messages.push(errs.to_string()),
            }
        }
        Err(ValidationErrors::single(format!(
            "no alternative matched: {}",
            messages.iter().join("; ")
        )))
    })
}

/// Wraps a scalar into a one-element list and validates every element.
/// None and the empty mapping both mean "no elements".
pub fn ensure_list(inner: Validator) -> Validator {
    Validator::new(move |value, ctx| {
        let items = match value {
            Value::None => return Ok(Value::List(vec![])),
            Value::Mapping(map) if map.is_empty() => return Ok(Value::List(vec![])),
            Value::List(items) => items,
            scalar => vec![scalar],
        };

        let mut out = Vec::with_capacity(items.len());
        let mut errors = ValidationErrors::default();
        for (i, item) in items.into_iter().enumerate() {
            match inner.validate(item, ctx) {
                Ok(validated) => out.push(validated),
                Err(errs) => errors.extend(errs.prefixed(PathItem::Index(i))),
            }
        }
        errors.into_result().map(|()| Value::List(out))
    })
}

fn present_keys(map: &Mapping, keys: &[String]) -> Vec<String> {
    keys.iter().filter(|k| map.contains_key(*k)).cloned().collect()
}

pub fn has_at_least_one_key(keys: &[&str]) -> Validator {
    let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
    Validator::new(move |value, _| {
        let Some(map) = value.as_mapping() else {
            return Err(ValidationErrors::single("expected a mapping"));
        };
        if present_keys(map, &keys).is_empty() {
            return Err(ValidationErrors::single(format!(
                "must contain at least one of {}",
                keys.iter().join(", ")
            )));
        }
        Ok(value)
    })
}

pub fn has_at_most_one_key(keys: &[&str]) -> Validator {
    let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
    Validator::new(move |value, _| {
        let Some(map) = value.as_mapping() else {
            return Err(ValidationErrors::single("expected a mapping"));
        };
        let present = present_keys(map, &keys);
        if present.len() > 1 {
            return Err(ValidationErrors::single(format!(
                "cannot specify more than one of {}",
                present.iter().join(", ")
            )));
        }
        Ok(value)
    })
}

pub fn has_exactly_one_key(keys: &[&str]) -> Validator {
    let at_least = has_at_least_one_key(keys);
    let at_most = has_at_most_one_key(keys);
    all(vec![at_least, at_most])
}

/// Lets a lambda stand in for a statically validated value. The inner
/// validator only runs for non-lambda input.
pub fn templatable(inner: Validator) -> Validator {
    Validator::new(move |value, ctx| match value {
        Value::Lambda(_) => Ok(value),
        other => inner.validate(other, ctx),
    })
}

/// Dispatches on a discriminator key (usually `type`) to one of several
/// schemas. The discriminator is kept in the output.
pub fn typed_schema(key: &str, variants: Vec<(&str, Schema)>) -> Validator {
    let key = key.to_string();
    let variants: IndexMap<String, Schema> = variants
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();
    Validator::new(move |value, ctx| {
        let Value::Mapping(mut map) = value else {
            return Err(ValidationErrors::single(format!(
                "expected a mapping, got {}",
                value.type_name()
            )));
        };
        let Some(type_value) = map.shift_remove(&key) else {
            return Err(ValidationErrors::from(
                ValidationError::new("required key not provided").prefixed(PathItem::key(&key)),
            ));
        };
        let Value::String(type_name) = type_value else {
            return Err(ValidationErrors::from(
                ValidationError::new("expected a string").prefixed(PathItem::key(&key)),
            ));
        };
        let Some(schema) = variants.get(&type_name) else {
            return Err(ValidationErrors::from(
                ValidationError::new(format!(
                    "unknown type '{type_name}', valid types are {}",
                    variants.keys().join(", ")
                ))
                .prefixed(PathItem::key(&key)),
            ));
        };

        let validated = schema.validate(Value::Mapping(map), ctx)?;
        let Value::Mapping(inner) = validated else {
            unreachable!("schema validation preserves the mapping shape")
        };
        let mut out = Mapping::new();
        out.insert(key.clone(), Value::String(type_name));
        out.extend(inner);
        Ok(Value::Mapping(out))
    })
}

/// Restricts an option to the given MCU families.
pub fn only_on(mcus: &[Mcu]) -> Validator {
    let mcus = mcus.to_vec();
    Validator::new(move |value, ctx| {
        if mcus.contains(&ctx.mcu) {
            Ok(value)
        } else {
            Err(ValidationErrors::single(format!(
                "this option is only available on {}",
                mcus.iter().join(", ")
            )))
        }
    })
}

/// Restricts an option to targets built with the given toolchain.
pub fn only_with_toolchain(toolchain: &str) -> Validator {
    let toolchain = toolchain.to_owned();
    Validator::new(move |value, ctx| {
        if ctx.toolchain.as_deref() == Some(toolchain.as_str()) {
            Ok(value)
        } else {
            Err(ValidationErrors::single(format!(
                "this option requires the {toolchain} toolchain"
            )))
        }
    })
}

pub(crate) fn validate_ident_name(value: &str) -> Result<String, ValidationErrors> {
    if value.is_empty() {
        return Err(ValidationErrors::single("identifier must not be empty"));
    }
    if value.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(ValidationErrors::single(
            "the first character of an identifier cannot be a digit",
        ));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(ValidationErrors::single(format!(
            "identifier contains invalid character '{bad}', only letters, digits and underscores are allowed",
        )));
    }
    Ok(value.to_string())
}

/// A valid identifier name, as a plain string.
pub fn valid_name() -> Validator {
    Validator::new(|value, _| {
        let Some(s) = value.as_str() else {
            return Err(ValidationErrors::single(format!(
                "expected a name, got {}",
                value.type_name()
            )));
        };
        validate_ident_name(s).map(Value::String)
    })
}

/// Declares an identifier of the given class. A missing name (None) becomes
/// an anonymous declaration that resolution names later.
pub fn declare_id(class: MockObjClass) -> Validator {
    Validator::new(move |value, _| match value {
        Value::None => Ok(Value::Id(Ident::anonymous(class.clone()))),
        Value::String(s) => {
            let name = validate_ident_name(&s)?;
            Ok(Value::Id(Ident::declared(name, class.clone())))
        }
        Value::Lambda(_) => Err(ValidationErrors::single("this option is not templatable")),
        other => Err(ValidationErrors::single(format!(
            "expected an identifier, got {}",
            other.type_name()
        ))),
    })
}

/// References an identifier declared elsewhere with the given class.
pub fn use_id(class: MockObjClass) -> Validator {
    Validator::new(move |value, _| match value {
        Value::String(s) => {
            let name = validate_ident_name(&s)?;
            Ok(Value::Id(Ident::reference(name, class.clone())))
        }
        Value::Id(id) if !id.is_declaration() => Ok(Value::Id(id)),
        Value::Lambda(_) => Err(ValidationErrors::single("this option is not templatable")),
        other => Err(ValidationErrors::single(format!(
            "expected an identifier, got {}",
            other.type_name()
        ))),
    })
}

/// A C++ snippet. Plain strings are promoted to lambda sources.
pub fn lambda_() -> Validator {
    Validator::new(|value, _| match value {
        Value::Lambda(_) => Ok(value),
        Value::String(s) => Ok(Value::Lambda(LambdaSource::new(s))),
        other => Err(ValidationErrors::single(format!(
            "expected a lambda, got {}",
            other.type_name()
        ))),
    })
}
