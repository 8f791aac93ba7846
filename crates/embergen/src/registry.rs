/*!
Named tables of schemas and builders.

Integrations, platform implementations, pin providers, and the automation
entry kinds (actions, conditions, filters) register here by name; a pass
looks them up by the keys the configuration uses. Entries land in the
tables at bootstrap or integration setup, never during a pass, and the same
key can only be claimed once.
*/

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::bail;
use embergen_cpp::{Expression, Ident, MockObj, MockObjClass};
use embergen_schema::coerce::{boolean, enum_mapping, positive_int, string_, string_strict};
use embergen_schema::conf::{
    CONF_ID, CONF_INITIAL_VALUE, CONF_INVERTED, CONF_MODE, CONF_NUMBER, CONF_PLATFORM, CONF_TYPE,
    CONF_TYPE_ID,
};
use embergen_schema::validate::{declare_id, ensure_list, lambda_};
use embergen_schema::{Mapping, Mcu, PathItem, Schema, ValidationErrors, Validator, Value};
use indexmap::IndexMap;
use itertools::Itertools;

use crate::cgen::{new_pointer_variable, pointer_variable, register_component, safe_exp};
use crate::codegen::Codegen;
use crate::coroutine::{job, then, Job};
use crate::cpp_types::{GLOBAL_VAR, GPIO_NS, INTERNAL_GPIO_PIN, LAMBDA_ACTION, LAMBDA_CONDITION};
use crate::errors::{CodegenError, CodegenResult};
use crate::lambda::ProcessLambda;

/// Task priorities for generation jobs. Higher runs first; the scheduler's
/// decay lets blocked high-priority work yield to the rest.
pub mod build_priority {
    /// Core plumbing other integrations assume is in place.
    pub const CORE: f64 = 100.0;
    /// Bus and pin setup.
    pub const HARDWARE: f64 = 60.0;
    pub const DEFAULT: f64 = 0.0;
    /// Runs once every component exists.
    pub const FINAL: f64 = -100.0;
}

/// A name-keyed table. Claiming the same key twice is an error.
pub struct Registry<T> {
    kind: &'static str,
    entries: IndexMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Registry {
            kind,
            entries: IndexMap::new(),
        }
    }

    pub fn register(&mut self, key: impl Into<String>, entry: T) -> CodegenResult<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(CodegenError::DuplicateRegistryKey {
                registry: self.kind.to_owned(),
                key,
            }
            .into());
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How an integration takes part in a pass: its fragment schema, the
/// priority of its generation job, and the builder producing that job from
/// the validated fragment.
pub struct Integration {
    pub schema: Validator,
    pub priority: f64,
    pub build: BuildFn,
}

pub type BuildFn = Box<dyn Fn(Value) -> CodegenResult<Job>>;

/// An action, condition, or filter: the class of the generated object, the
/// schema of its payload, and the builder that emits it. The builder gets
/// the anonymous ID validation minted under `type_id`.
pub struct AutomationEntry {
    pub class: MockObjClass,
    pub schema: Validator,
    pub build: AutomationBuildFn,
}

pub type AutomationBuildFn = Box<dyn Fn(Ident, Value) -> CodegenResult<Job>>;

/// One flavor of GPIO pin. Host MCUs register a provider under their
/// platform name; I/O expanders register under their config key.
pub struct PinProvider {
    pub schema: Validator,
    pub build: PinBuildFn,
}

pub type PinBuildFn = Box<dyn Fn(&Codegen, &Mapping) -> CodegenResult<MockObj>>;

pub type SharedRegistry<T> = Rc<RefCell<Registry<T>>>;

/// Every table a pass consults. Construct with [`bootstrap`], then let the
/// integrations under test or in use claim their names.
pub struct Registries {
    integrations: Registry<Integration>,
    domains: IndexMap<String, Registry<Integration>>,
    pins: SharedRegistry<PinProvider>,
    actions: SharedRegistry<AutomationEntry>,
    conditions: SharedRegistry<AutomationEntry>,
    filters: SharedRegistry<AutomationEntry>,
}

impl Registries {
    pub fn new() -> Self {
        Registries {
            integrations: Registry::new("integration"),
            domains: IndexMap::new(),
            pins: Rc::new(RefCell::new(Registry::new("pin provider"))),
            actions: Rc::new(RefCell::new(Registry::new("action"))),
            conditions: Rc::new(RefCell::new(Registry::new("condition"))),
            filters: Rc::new(RefCell::new(Registry::new("filter"))),
        }
    }

    pub fn register_integration(
        &mut self,
        name: impl Into<String>,
        integration: Integration,
    ) -> CodegenResult<()> {
        self.integrations.register(name, integration)
    }

    pub fn integration(&self, name: &str) -> Option<&Integration> {
        self.integrations.get(name)
    }

    /// Declares a config key whose value is a list of platform fragments
    /// (`sensor:`, `switch:`, ...).
    pub fn add_platform_domain(&mut self, domain: impl Into<String>) -> CodegenResult<()> {
        let domain = domain.into();
        if self.domains.contains_key(&domain) {
            return Err(CodegenError::DuplicateRegistryKey {
                registry: "platform domain".to_owned(),
                key: domain,
            }
            .into());
        }
        self.domains.insert(domain, Registry::new("platform"));
        Ok(())
    }

    pub fn is_platform_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    pub fn register_platform(
        &mut self,
        domain: &str,
        name: impl Into<String>,
        entry: Integration,
    ) -> CodegenResult<()> {
        let Some(registry) = self.domains.get_mut(domain) else {
            bail!("'{domain}' is not a platform domain");
        };
        registry.register(name, entry)
    }

    pub fn platform(&self, domain: &str, name: &str) -> Option<&Integration> {
        self.domains.get(domain)?.get(name)
    }

    pub fn platform_names(&self, domain: &str) -> Vec<String> {
        match self.domains.get(domain) {
            Some(registry) => registry.keys().map(str::to_owned).collect(),
            None => Vec::new(),
        }
    }

    pub fn register_pin_provider(
        &mut self,
        name: impl Into<String>,
        provider: PinProvider,
    ) -> CodegenResult<()> {
        self.pins.borrow_mut().register(name, provider)
    }

    /// A handle generation jobs can capture to build pins later, after the
    /// `Registries` value itself is out of reach.
    pub fn pin_registry(&self) -> SharedRegistry<PinProvider> {
        Rc::clone(&self.pins)
    }

    pub fn register_action(
        &mut self,
        name: impl Into<String>,
        entry: AutomationEntry,
    ) -> CodegenResult<()> {
        self.actions.borrow_mut().register(name, entry)
    }

    pub fn action_registry(&self) -> SharedRegistry<AutomationEntry> {
        Rc::clone(&self.actions)
    }

    pub fn condition_registry(&self) -> SharedRegistry<AutomationEntry> {
        Rc::clone(&self.conditions)
    }

    pub fn filter_registry(&self) -> SharedRegistry<AutomationEntry> {
        Rc::clone(&self.filters)
    }

    pub fn register_condition(
        &mut self,
        name: impl Into<String>,
        entry: AutomationEntry,
    ) -> CodegenResult<()> {
        self.conditions.borrow_mut().register(name, entry)
    }

    pub fn register_filter(
        &mut self,
        name: impl Into<String>,
        entry: AutomationEntry,
    ) -> CodegenResult<()> {
        self.filters.borrow_mut().register(name, entry)
    }

    pub fn action_validator(&self) -> Validator {
        registry_entry_validator("action", Rc::clone(&self.actions))
    }

    pub fn condition_validator(&self) -> Validator {
        registry_entry_validator("condition", Rc::clone(&self.conditions))
    }

    pub fn filter_validator(&self) -> Validator {
        registry_entry_validator("filter", Rc::clone(&self.filters))
    }

    pub fn build_action(&self, config: &Mapping) -> CodegenResult<Job> {
        build_registry_entry("action", &self.actions.borrow(), config)
    }

    pub fn build_condition(&self, config: &Mapping) -> CodegenResult<Job> {
        build_registry_entry("condition", &self.conditions.borrow(), config)
    }

    pub fn build_filter(&self, config: &Mapping) -> CodegenResult<Job> {
        build_registry_entry("filter", &self.filters.borrow(), config)
    }

    /// Accepts a bare pin number or a pin mapping. Dispatch is by expander
    /// key when the mapping carries one, else by the target MCU; the chosen
    /// provider name lands in the output under `platform`.
    pub fn pin_validator(&self) -> Validator {
        let pins = Rc::clone(&self.pins);
        Validator::new(move |value, ctx| {
            let mapping = match value {
                Value::Int(number) => {
                    let mut mapping = Mapping::new();
                    mapping.insert(CONF_NUMBER.to_owned(), Value::Int(number));
                    mapping
                }
                Value::Mapping(mapping) => mapping,
                other => {
                    return Err(ValidationErrors::single(format!(
                        "expected a pin number or pin mapping, got {}",
                        other.type_name()
                    )));
                }
            };

            let pins = pins.borrow();
            let provider_name = mapping
                .keys()
                .find(|key| pins.contains(key))
                .cloned()
                .unwrap_or_else(|| ctx.mcu.as_str().to_owned());
            let Some(provider) = pins.get(&provider_name) else {
                return Err(ValidationErrors::single(format!(
                    "no pin provider registered for '{provider_name}'"
                )));
            };

            let validated = provider.schema.validate(Value::Mapping(mapping), ctx)?;
            let Value::Mapping(mut mapping) = validated else {
                return Err(ValidationErrors::single("pin schemas produce a mapping"));
            };
            mapping.shift_insert(0, CONF_PLATFORM.to_owned(), Value::from(provider_name));
            Ok(Value::Mapping(mapping))
        })
    }

    pub fn build_pin(&self, core: &Codegen, config: &Mapping) -> CodegenResult<MockObj> {
        gpio_pin_expression(core, &self.pins.borrow(), config)
    }
}

impl Default for Registries {
    fn default() -> Self {
        Registries::new()
    }
}

/// Builds the pin a validated pin mapping describes and returns its
/// accessor expression.
pub fn gpio_pin_expression(
    core: &Codegen,
    pins: &Registry<PinProvider>,
    config: &Mapping,
) -> CodegenResult<MockObj> {
    let Some(Value::String(provider_name)) = config.get(CONF_PLATFORM) else {
        bail!("pin fragments carry their provider after validation");
    };
    let Some(provider) = pins.get(provider_name) else {
        bail!("no pin provider registered for '{provider_name}'");
    };
    (provider.build)(core, config)
}

/// Validates a one-key fragment like `{lambda: ...}` against a registry.
/// The output keeps the matched key's validated payload and gains a fresh
/// anonymous ID of the entry's class under `type_id`.
pub fn registry_entry_validator(
    kind: &'static str,
    registry: SharedRegistry<AutomationEntry>,
) -> Validator {
    Validator::new(move |value, ctx| {
        let Value::Mapping(mapping) = value else {
            return Err(ValidationErrors::single(format!(
                "expected a mapping with a single {kind} key, got {}",
                value.type_name()
            )));
        };
        if mapping.len() != 1 {
            return Err(ValidationErrors::single(format!(
                "expected exactly one {kind}, got {} keys",
                mapping.len()
            )));
        }

        let registry = registry.borrow();
        let Some((key, payload)) = mapping.into_iter().next() else {
            unreachable!("length checked above");
        };
        let Some(entry) = registry.get(&key) else {
            return Err(ValidationErrors::single(format!(
                "unknown {kind} '{key}', valid {kind}s are {}",
                registry.keys().join(", ")
            )));
        };

        let validated = entry
            .schema
            .validate(payload, ctx)
            .map_err(|errors| errors.prefixed(PathItem::Key(key.clone())))?;

        let mut out = Mapping::new();
        out.insert(key, validated);
        out.insert(
            CONF_TYPE_ID.to_owned(),
            Value::Id(Ident::anonymous(entry.class.clone())),
        );
        Ok(Value::Mapping(out))
    })
}

/// Hands a validated registry fragment to the matching entry's builder.
pub fn build_registry_entry(
    kind: &'static str,
    registry: &Registry<AutomationEntry>,
    config: &Mapping,
) -> CodegenResult<Job> {
    let Some((key, payload)) = config.iter().find(|(key, _)| registry.contains(key)) else {
        bail!("no registered {kind} in the config fragment");
    };
    let Some(Value::Id(type_id)) = config.get(CONF_TYPE_ID) else {
        bail!("registry fragments carry a type_id after validation");
    };
    let Some(entry) = registry.get(key) else {
        unreachable!("the key was found in this registry above");
    };
    (entry.build)(type_id.clone(), payload.clone())
}

fn lambda_automation_entry(label: &'static str, class: &MockObjClass) -> AutomationEntry {
    AutomationEntry {
        class: class.clone(),
        schema: lambda_(),
        build: Box::new(move |type_id, value| {
            let Value::Lambda(source) = value else {
                bail!("the payload validates to a lambda source");
            };
            let task = ProcessLambda::new(&source, vec![], None);
            Ok(then(label, task, move |core, lambda| {
                new_pointer_variable(core, &type_id, vec![lambda])?;
                Ok(())
            }))
        }),
    }
}

fn host_pin_schema() -> Schema {
    let mut modes = IndexMap::new();
    modes.insert(
        "INPUT".to_owned(),
        Expression::from(GPIO_NS.member("FLAG_INPUT")),
    );
    modes.insert(
        "OUTPUT".to_owned(),
        Expression::from(GPIO_NS.member("FLAG_OUTPUT")),
    );
    modes.insert(
        "INPUT_PULLUP".to_owned(),
        Expression::raw(format!(
            "{} | {}",
            GPIO_NS.member("FLAG_INPUT"),
            GPIO_NS.member("FLAG_PULLUP")
        )),
    );
    Schema::new()
        .generate_id(INTERNAL_GPIO_PIN.clone())
        .required(CONF_NUMBER, positive_int())
        .optional_with_default(CONF_MODE, enum_mapping(modes), || Value::from("INPUT"))
        .optional_with_default(CONF_INVERTED, boolean(), || Value::Bool(false))
}

fn build_host_pin(core: &Codegen, config: &Mapping) -> CodegenResult<MockObj> {
    let Some(Value::Id(id)) = config.get(CONF_ID) else {
        bail!("pin fragments declare an ID during validation");
    };
    let var = new_pointer_variable(core, id, vec![])?;
    if let Some(number) = config.get(CONF_NUMBER) {
        let number = safe_exp(number)?;
        core.add(Expression::from(var.member("set_pin").call(vec![number])));
    }
    if let Some(mode) = config.get(CONF_MODE) {
        let mode = safe_exp(mode)?;
        core.add(Expression::from(var.member("set_flags").call(vec![mode])));
    }
    if let Some(inverted) = config.get(CONF_INVERTED) {
        let inverted = safe_exp(inverted)?;
        core.add(Expression::from(
            var.member("set_inverted").call(vec![inverted]),
        ));
    }
    Ok(var)
}

fn globals_schema() -> Validator {
    let item = Schema::new()
        .required(CONF_ID, declare_id(GLOBAL_VAR.clone()))
        .required(CONF_TYPE, string_strict())
        .optional(CONF_INITIAL_VALUE, string_());
    ensure_list(item.into())
}

fn build_globals(config: Value) -> CodegenResult<Job> {
    Ok(job("globals", move |core| {
        let Value::List(items) = &config else {
            bail!("the globals fragment validates to a list");
        };
        for item in items {
            let Some(item) = item.as_mapping() else {
                bail!("the globals fragment validates to a list of mappings");
            };
            let Some(Value::Id(id)) = item.get(CONF_ID) else {
                bail!("every global declares an ID during validation");
            };
            let Some(Value::String(type_)) = item.get(CONF_TYPE) else {
                bail!("every global carries its C++ type");
            };

            let class = GLOBAL_VAR.template(vec![Expression::raw(type_.clone())]);
            let mut args = Vec::new();
            if let Some(Value::String(initial)) = item.get(CONF_INITIAL_VALUE) {
                args.push(Expression::raw(initial.clone()));
            }
            let rhs = Expression::from(class.as_obj().new_().call(args));
            let var = pointer_variable(core, id, rhs, Some(&class))?;
            register_component(core, &var, item)?;
        }
        Ok(())
    }))
}

/// The tables every pass starts from: the lambda action and condition, a
/// host pin provider per MCU, and the `globals` integration.
pub fn bootstrap() -> CodegenResult<Registries> {
    let mut registries = Registries::new();

    registries.register_action(
        "lambda",
        lambda_automation_entry("lambda action", &LAMBDA_ACTION),
    )?;
    registries.register_condition(
        "lambda",
        lambda_automation_entry("lambda condition", &LAMBDA_CONDITION),
    )?;

    for mcu in [Mcu::Host, Mcu::Esp32, Mcu::Esp8266, Mcu::Rp2040] {
        registries.register_pin_provider(
            mcu.as_str(),
            PinProvider {
                schema: host_pin_schema().into(),
                build: Box::new(build_host_pin),
            },
        )?;
    }

    registries.register_integration(
        "globals",
        Integration {
            schema: globals_schema(),
            priority: build_priority::CORE,
            build: Box::new(build_globals),
        },
    )?;

    Ok(registries)
}
