/*!
The driver of one generation pass.

[`generate`] takes a parsed configuration tree through validation, ID
resolution, and the scheduler, then renders the artifacts. Validation runs
over the whole tree before any builder executes, so the user sees every
config problem at once and builders only ever receive clean fragments. The
accumulator is reset on the way out, pass or fail, so one [`Codegen`] can
host any number of passes.
*/

use std::collections::HashSet;

use anyhow::bail;
use embergen_cpp::{Expression, Ident};
use embergen_schema::conf::CONF_PLATFORM;
use embergen_schema::{Context, Mapping, Mcu, PathItem, ValidationError, ValidationErrors, Value};
use scopeguard::defer;
use tracing::debug;

use crate::codegen::Codegen;
use crate::cpp_types::COMPONENT;
use crate::emit::{render_cpp_source, render_defines_header, render_manifest, Artifacts};
use crate::errors::{CodegenError, CodegenResult};
use crate::registry::{BuildFn, Registries};

/// The hardware one pass generates for.
#[derive(Clone, Debug)]
pub struct Target {
    pub mcu: Mcu,
    pub board: String,
    /// Toolchain tag for the build manifest and toolchain-gated options.
    pub toolchain: String,
}

impl Target {
    pub fn new(mcu: Mcu, board: impl Into<String>) -> Self {
        Target {
            mcu,
            board: board.into(),
            toolchain: "arduino".to_owned(),
        }
    }

    pub fn with_toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.toolchain = toolchain.into();
        self
    }
}

/// A validated fragment waiting to be queued: the builder that turns it
/// into a job and the priority the job runs at.
struct Planned<'r> {
    priority: f64,
    build: &'r BuildFn,
    config: Value,
}

/// Runs one full generation pass over `config`.
///
/// Every top-level key must name a registered integration or a platform
/// domain. Platform domain values are lists of fragments dispatched on
/// their `platform` key; everything else validates against the
/// integration's own schema.
pub fn generate(
    core: &Codegen,
    registries: &Registries,
    target: &Target,
    config: Mapping,
) -> CodegenResult<Artifacts> {
    defer! { core.reset() }
    debug!("generating for board '{}' ({})", target.board, target.mcu);

    let ctx = Context::new(target.mcu).with_toolchain(target.toolchain.as_str());
    core.add_define(format!("USE_{}", target.mcu.as_str().to_uppercase()), None);
    core.add_define(
        "EMBER_BOARD",
        Some(Expression::StringLiteral(target.board.clone())),
    );

    let mut errors = ValidationErrors::default();
    let mut planned = Vec::new();
    for (key, fragment) in config {
        if registries.is_platform_domain(&key) {
            core.load_integration(key.as_str());
            validate_domain(
                core,
                registries,
                &key,
                fragment,
                &ctx,
                &mut planned,
                &mut errors,
            );
        } else if let Some(integration) = registries.integration(&key) {
            core.load_integration(key.as_str());
            match integration.schema.validate(fragment, &ctx) {
                Ok(validated) => planned.push(Planned {
                    priority: integration.priority,
                    build: &integration.build,
                    config: validated,
                }),
                Err(errs) => errors.extend(errs.prefixed(PathItem::key(key.as_str()))),
            }
        } else {
            errors.push(
                ValidationError::new("integration not found").prefixed(PathItem::key(key.as_str())),
            );
        }
    }
    errors.into_result()?;

    resolve_configured_ids(core, &planned)?;

    debug!("queueing {} builder job(s)", planned.len());
    for item in planned {
        let job = (item.build)(item.config)?;
        core.add_job(item.priority, job);
    }
    core.flush_tasks()?;
    core.finish()?;

    Ok(Artifacts {
        cpp_source: render_cpp_source(core),
        defines_header: render_defines_header(core),
        manifest: render_manifest(core, target),
        loaded_integrations: core.loaded_integrations(),
    })
}

/// Validates one platform domain's fragment list, dispatching each entry on
/// its `platform` key. A bare mapping counts as a one-entry list.
fn validate_domain<'r>(
    core: &Codegen,
    registries: &'r Registries,
    domain: &str,
    fragment: Value,
    ctx: &Context,
    planned: &mut Vec<Planned<'r>>,
    errors: &mut ValidationErrors,
) {
    let items = match fragment {
        Value::List(items) => items,
        Value::Mapping(mapping) => vec![Value::Mapping(mapping)],
        other => {
            errors.push(
                ValidationError::new(format!(
                    "expected a list of {domain} platform entries, got {}",
                    other.type_name()
                ))
                .prefixed(PathItem::key(domain)),
            );
            return;
        }
    };

    for (index, item) in items.into_iter().enumerate() {
        let located = |error: ValidationError| {
            error
                .prefixed(PathItem::Index(index))
                .prefixed(PathItem::key(domain))
        };

        let mut mapping = match item {
            Value::Mapping(mapping) => mapping,
            other => {
                errors.push(located(ValidationError::new(format!(
                    "expected a platform entry mapping, got {}",
                    other.type_name()
                ))));
                continue;
            }
        };
        let platform_name = match mapping.shift_remove(CONF_PLATFORM) {
            Some(Value::String(name)) => name,
            Some(other) => {
                errors.push(located(ValidationError::new(format!(
                    "'platform' must be a string, got {}",
                    other.type_name()
                ))));
                continue;
            }
            None => {
                errors.push(located(ValidationError::new(
                    "a platform entry needs a 'platform' key",
                )));
                continue;
            }
        };
        let Some(entry) = registries.platform(domain, &platform_name) else {
            errors.push(located(ValidationError::new(format!(
                "unknown platform '{platform_name}', valid platforms for '{domain}' are {}",
                registries.platform_names(domain).join(", ")
            ))));
            continue;
        };
        core.load_integration(platform_name.as_str());

        match entry.schema.validate(Value::Mapping(mapping), ctx) {
            Ok(mut validated) => {
                if let Value::Mapping(out) = &mut validated {
                    out.shift_insert(
                        0,
                        CONF_PLATFORM.to_owned(),
                        Value::from(platform_name.as_str()),
                    );
                }
                planned.push(Planned {
                    priority: entry.priority,
                    build: &entry.build,
                    config: validated,
                });
            }
            Err(errs) => errors.extend(
                errs.prefixed(PathItem::Index(index))
                    .prefixed(PathItem::key(domain)),
            ),
        }
    }
}

/// Checks manual IDs for collisions, names the anonymous ones, and marks
/// component declarations for the registration check in [`Codegen::finish`].
///
/// Manual names are claimed first, in document order, then anonymous IDs
/// resolve against everything claimed so far. Loaded integration names are
/// off limits either way.
fn resolve_configured_ids(core: &Codegen, planned: &[Planned<'_>]) -> CodegenResult<()> {
    let mut declared = Vec::new();
    for item in planned {
        collect_declarations(&item.config, &mut declared);
    }

    let integrations: HashSet<String> = core.loaded_integrations().into_iter().collect();
    let mut used = integrations.clone();
    for id in &declared {
        let Some(name) = id.name() else { continue };
        if integrations.contains(&name) {
            bail!("ID {name} conflicts with the name of a loaded integration");
        }
        if !used.insert(name.clone()) {
            return Err(CodegenError::DuplicateId { id: name }.into());
        }
    }
    for id in &declared {
        if !id.is_resolved() {
            used.insert(id.resolve(&used));
        }
    }

    for id in &declared {
        let is_component = id
            .class()
            .is_some_and(|class| class.inherits_from(&COMPONENT));
        if is_component {
            if let Some(name) = id.name() {
                core.track_component(name);
            }
        }
    }
    Ok(())
}

fn collect_declarations(value: &Value, out: &mut Vec<Ident>) {
    match value {
        Value::Id(id) if id.is_declaration() => out.push(id.clone()),
        Value::Mapping(mapping) => {
            for nested in mapping.values() {
                collect_declarations(nested, out);
            }
        }
        Value::List(items) => {
            for item in items {
                collect_declarations(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cgen::{new_pointer_variable, register_component};
    use crate::coroutine::job;
    use crate::cpp_types::EMBER_NS;
    use crate::registry::{bootstrap, build_priority, Integration};
    use embergen_schema::coerce::positive_int;
    use embergen_schema::conf::CONF_ID;
    use embergen_schema::Schema;
    use pretty_assertions::assert_eq;

    fn target() -> Target {
        Target::new(Mcu::Esp32, "esp32dev")
    }

    fn mapping(entries: Vec<(&str, Value)>) -> Mapping {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect()
    }

    /// A minimal sensor-like platform: a generated ID, a required pin
    /// number, and a builder that declares and registers the component.
    fn demo_registries() -> Registries {
        let mut registries = bootstrap().unwrap();
        registries.add_platform_domain("sensor").unwrap();

        let class = EMBER_NS.class_("DemoSensor", &[COMPONENT.clone()]);
        let schema = Schema::new()
            .generate_id(class)
            .required("pin", positive_int());
        registries
            .register_platform(
                "sensor",
                "demo",
                Integration {
                    schema: schema.into(),
                    priority: build_priority::DEFAULT,
                    build: Box::new(|config| {
                        Ok(job("demo sensor", move |core| {
                            let Some(item) = config.as_mapping() else {
                                bail!("platform fragments validate to mappings");
                            };
                            let Some(Value::Id(id)) = item.get(CONF_ID) else {
                                bail!("the schema declares an ID");
                            };
                            let var = new_pointer_variable(core, id, vec![])?;
                            register_component(core, &var, item)?;
                            Ok(())
                        }))
                    }),
                },
            )
            .unwrap();
        registries
    }

    fn demo_entry(extra: Vec<(&str, Value)>) -> Value {
        let mut entry = vec![("platform", Value::from("demo")), ("pin", Value::Int(5))];
        entry.extend(extra);
        Value::Mapping(mapping(entry))
    }

    #[test_log::test]
    fn a_pass_runs_end_to_end() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![(
            "sensor",
            Value::List(vec![demo_entry(vec![("id", Value::from("my_sensor"))])]),
        )]);

        let artifacts = generate(&core, &registries, &target(), config).unwrap();
        assert!(artifacts.cpp_source.contains("ember::DemoSensor *my_sensor_;"));
        assert!(artifacts
            .cpp_source
            .contains("my_sensor_ = new ember::DemoSensor();"));
        assert!(artifacts
            .cpp_source
            .contains("App.register_component(my_sensor_);"));
        assert_eq!(artifacts.loaded_integrations, vec!["sensor", "demo"]);
        assert!(artifacts.defines_header.contains("#define USE_ESP32"));
        assert!(artifacts
            .defines_header
            .contains("#define EMBER_BOARD \"esp32dev\""));
        assert_eq!(artifacts.manifest.board, "esp32dev");
    }

    #[test_log::test]
    fn anonymous_entries_get_distinct_names() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![(
            "sensor",
            Value::List(vec![demo_entry(vec![]), demo_entry(vec![])]),
        )]);

        let artifacts = generate(&core, &registries, &target(), config).unwrap();
        assert!(artifacts
            .cpp_source
            .contains("ember::DemoSensor *ember_demosensor_;"));
        assert!(artifacts
            .cpp_source
            .contains("ember::DemoSensor *ember_demosensor_2_;"));
    }

    #[test]
    fn a_bare_mapping_counts_as_one_entry() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![("sensor", demo_entry(vec![]))]);

        let artifacts = generate(&core, &registries, &target(), config).unwrap();
        assert!(artifacts
            .cpp_source
            .contains("ember_demosensor_ = new ember::DemoSensor();"));
    }

    #[test]
    fn unknown_top_level_keys_are_reported() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![("fancy", Value::Mapping(Mapping::new()))]);

        let err = generate(&core, &registries, &target(), config).unwrap_err();
        assert_eq!(err.to_string(), "fancy: integration not found");
    }

    #[test]
    fn unknown_platforms_list_the_alternatives() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![(
            "sensor",
            Value::List(vec![Value::Mapping(mapping(vec![(
                "platform",
                Value::from("nope"),
            )]))]),
        )]);

        let err = generate(&core, &registries, &target(), config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "sensor[0]: unknown platform 'nope', valid platforms for 'sensor' are demo"
        );
    }

    #[test]
    fn entries_missing_the_platform_key_are_rejected() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![(
            "sensor",
            Value::List(vec![Value::Mapping(mapping(vec![("pin", Value::Int(5))]))]),
        )]);

        let err = generate(&core, &registries, &target(), config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "sensor[0]: a platform entry needs a 'platform' key"
        );
    }

    #[test]
    fn validation_reports_every_problem_at_once() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![
            (
                "sensor",
                Value::List(vec![Value::Mapping(mapping(vec![(
                    "platform",
                    Value::from("demo"),
                )]))]),
            ),
            ("fancy", Value::Mapping(Mapping::new())),
        ]);

        let err = generate(&core, &registries, &target(), config).unwrap_err();
        let errors = err.downcast_ref::<ValidationErrors>().unwrap();
        assert_eq!(errors.len(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("sensor[0].pin"), "{rendered}");
        assert!(rendered.contains("fancy: integration not found"), "{rendered}");
    }

    #[test]
    fn duplicate_manual_ids_fail_the_pass() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![(
            "sensor",
            Value::List(vec![
                demo_entry(vec![("id", Value::from("dup"))]),
                demo_entry(vec![("id", Value::from("dup"))]),
            ]),
        )]);

        let err = generate(&core, &registries, &target(), config).unwrap_err();
        assert!(err.to_string().contains("ID dup redefined"), "{err}");
    }

    #[test]
    fn ids_may_not_shadow_integration_names() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = mapping(vec![(
            "sensor",
            Value::List(vec![demo_entry(vec![("id", Value::from("sensor"))])]),
        )]);

        let err = generate(&core, &registries, &target(), config).unwrap_err();
        assert!(
            err.to_string()
                .contains("conflicts with the name of a loaded integration"),
            "{err}"
        );
    }

    #[test_log::test]
    fn higher_priority_integrations_emit_first() {
        let registries = demo_registries();
        let core = Codegen::new();
        // The sensor comes first in the document, but globals run at CORE
        // priority and must land first in setup().
        let config = mapping(vec![
            ("sensor", Value::List(vec![demo_entry(vec![])])),
            (
                "globals",
                Value::List(vec![Value::Mapping(mapping(vec![
                    ("id", Value::from("counter")),
                    ("type", Value::from("int")),
                ]))]),
            ),
        ]);

        let artifacts = generate(&core, &registries, &target(), config).unwrap();
        let counter = artifacts
            .cpp_source
            .find("counter_ = new ember::GlobalVariableComponent<int>();")
            .unwrap();
        let sensor = artifacts
            .cpp_source
            .find("ember_demosensor_ = new ember::DemoSensor();")
            .unwrap();
        assert!(counter < sensor);
    }

    #[test_log::test]
    fn the_accumulator_resets_between_passes() {
        let registries = demo_registries();
        let core = Codegen::new();
        let config = || {
            mapping(vec![(
                "sensor",
                Value::List(vec![demo_entry(vec![("id", Value::from("again"))])]),
            )])
        };

        let first = generate(&core, &registries, &target(), config()).unwrap();
        let second = generate(&core, &registries, &target(), config()).unwrap();
        assert_eq!(first.cpp_source, second.cpp_source);
    }

    #[test]
    fn failed_passes_reset_too() {
        let registries = demo_registries();
        let core = Codegen::new();
        let bad = mapping(vec![("fancy", Value::Mapping(Mapping::new()))]);
        generate(&core, &registries, &target(), bad).unwrap_err();

        let good = mapping(vec![("sensor", Value::List(vec![demo_entry(vec![])]))]);
        let artifacts = generate(&core, &registries, &target(), good).unwrap();
        assert!(!artifacts.cpp_source.contains("fancy"));
        assert_eq!(artifacts.loaded_integrations, vec!["sensor", "demo"]);
    }
}
