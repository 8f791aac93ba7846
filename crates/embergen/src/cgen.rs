/*!
Helpers that turn validated configuration values into accumulated C++.

`safe_exp` is the single conversion point from a configuration [`Value`] to
an [`Expression`]. The `*variable` helpers pair a declaration in the global
region with an assignment in the setup region and register the binding, so
later tasks and lambdas can refer to it by ID.
*/

use anyhow::bail;
use embergen_cpp::{Expression, Ident, MemberOp, MockObj, MockObjClass, Parameter};
use embergen_schema::conf::{CONF_ID, CONF_SETUP_PRIORITY, CONF_UPDATE_INTERVAL};
use embergen_schema::{Mapping, Value};

use crate::codegen::Codegen;
use crate::coroutine::{Coroutine, Resume, WaitOn};
use crate::cpp_types::APP;
use crate::errors::{CodegenError, CodegenResult};
use crate::lambda::ProcessLambda;

/// Converts a validated configuration value into a C++ expression.
///
/// Time periods keep their native unit: 16ms becomes the integer literal
/// `16`, and the receiving setter decides what unit it expects. Schemas pin
/// the unit with the `positive_time_period_*` validators.
pub fn safe_exp(value: &Value) -> CodegenResult<Expression> {
    Ok(match value {
        Value::Bool(value) => Expression::BoolLiteral(*value),
        Value::Int(value) => Expression::IntLiteral(*value),
        Value::Float(value) => Expression::FloatLiteral(*value),
        Value::String(value) => Expression::StringLiteral(value.clone()),
        Value::HexInt(value) => Expression::HexIntLiteral(*value),
        Value::Bytes(bytes) => Expression::ArrayInitializer {
            args: bytes
                .iter()
                .map(|byte| Expression::HexIntLiteral(u64::from(*byte)))
                .collect(),
            multiline: false,
        },
        Value::TimePeriod(period) => Expression::IntLiteral(i64::try_from(period.value)?),
        Value::Enum(value) => value.expression.clone(),
        Value::List(items) => Expression::ArrayInitializer {
            args: items.iter().map(safe_exp).collect::<CodegenResult<_>>()?,
            multiline: false,
        },
        Value::Id(id) => {
            return Err(CodegenError::IdAsValue {
                id: id.name().unwrap_or_else(|| "(anonymous)".to_owned()),
            }
            .into());
        }
        Value::Lambda(lambda) => bail!(
            "lambda '{}' was passed as a plain value, did you forget to await it?",
            lambda.source()
        ),
        Value::None => bail!("an empty value has no expression form"),
        Value::Mapping(_) => bail!("a mapping has no expression form"),
    })
}

/// The C++ symbol for a resolved ID. Generated symbols carry a trailing
/// underscore so they can never collide with runtime names.
fn symbol(id: &Ident) -> CodegenResult<String> {
    match id.name() {
        Some(name) => Ok(format!("{name}_")),
        None => bail!("IDs are resolved before code generation runs"),
    }
}

fn declared_class(
    id: &Ident,
    class: Option<&MockObjClass>,
) -> CodegenResult<(Ident, MockObjClass)> {
    let id = match class {
        Some(class) => id.with_class(class.clone()),
        None => id.clone(),
    };
    let Some(class) = id.class().cloned() else {
        bail!("cannot declare a variable for an untyped ID");
    };
    Ok((id, class))
}

/// Declares `Type name_ = rhs;` in the setup region and registers the
/// binding. Member access on the returned object uses `.`.
///
/// `class` overrides the type the ID was declared with; templated globals
/// use this to inject their value type.
pub fn variable(
    core: &Codegen,
    id: &Ident,
    rhs: Expression,
    class: Option<&MockObjClass>,
) -> CodegenResult<MockObj> {
    let (id, class) = declared_class(id, class)?;
    let name = symbol(&id)?;
    core.add(Expression::Assignment {
        declared: Some((Box::new(Expression::from(&class)), "")),
        target: Box::new(Expression::raw(name.clone())),
        rhs: Box::new(rhs),
    });
    let obj = MockObj::new(Expression::Raw(name), MemberOp::Dot);
    core.register_variable(&id, obj.clone())?;
    Ok(obj)
}

/// Declares `Type *name_;` in the global region, assigns it in the setup
/// region, and registers the binding. Member access on the returned object
/// uses `->`.
pub fn pointer_variable(
    core: &Codegen,
    id: &Ident,
    rhs: Expression,
    class: Option<&MockObjClass>,
) -> CodegenResult<MockObj> {
    let (id, class) = declared_class(id, class)?;
    let name = symbol(&id)?;
    core.add_global(Expression::VariableDeclaration {
        type_: Box::new(Expression::from(&class)),
        modifier: "*",
        name: name.clone(),
    });
    core.add(Expression::Assignment {
        declared: None,
        target: Box::new(Expression::raw(name.clone())),
        rhs: Box::new(rhs),
    });
    let obj = MockObj::new(Expression::Raw(name), MemberOp::Arrow);
    core.register_variable(&id, obj.clone())?;
    Ok(obj)
}

/// Heap-constructs the ID's class: `name_ = new Type(args...);`.
pub fn new_pointer_variable(
    core: &Codegen,
    id: &Ident,
    args: Vec<Expression>,
) -> CodegenResult<MockObj> {
    let Some(class) = id.class() else {
        bail!("cannot construct a variable for an untyped ID");
    };
    let rhs = Expression::from(class.as_obj().new_().call(args));
    pointer_variable(core, id, rhs, None)
}

fn static_array(
    core: &Codegen,
    id: &Ident,
    rhs: Expression,
    progmem: bool,
) -> CodegenResult<MockObj> {
    let (id, class) = declared_class(id, None)?;
    let name = symbol(&id)?;
    core.add_global(Expression::StaticArrayAssignment {
        type_: Box::new(Expression::from(&class)),
        name: name.clone(),
        rhs: Box::new(rhs),
        progmem,
    });
    let obj = MockObj::new(Expression::Raw(name), MemberOp::Dot);
    core.register_variable(&id, obj.clone())?;
    Ok(obj)
}

/// A read-only array placed in program memory. The ID's class is the
/// element type.
pub fn progmem_array(core: &Codegen, id: &Ident, rhs: Expression) -> CodegenResult<MockObj> {
    static_array(core, id, rhs, true)
}

pub fn static_const_array(core: &Codegen, id: &Ident, rhs: Expression) -> CodegenResult<MockObj> {
    static_array(core, id, rhs, false)
}

/// Emits the registration calls for a component variable and clears its ID
/// from the pending set. The config may carry `setup_priority` and
/// `update_interval` overrides, applied before the registration call.
pub fn register_component(core: &Codegen, var: &MockObj, config: &Mapping) -> CodegenResult<()> {
    let Some(Value::Id(id)) = config.get(CONF_ID) else {
        bail!("register_component needs the config fragment that declared the component");
    };
    let Some(name) = id.name() else {
        bail!("IDs are resolved before code generation runs");
    };
    if !core.mark_component_registered(&name) {
        bail!("'{name}' is not a pending component, was register_component called twice?");
    }
    if let Some(value) = config.get(CONF_SETUP_PRIORITY) {
        let priority = safe_exp(value)?;
        core.add(Expression::from(
            var.member("set_setup_priority").call(vec![priority]),
        ));
    }
    if let Some(value) = config.get(CONF_UPDATE_INTERVAL) {
        let interval = safe_exp(value)?;
        core.add(Expression::from(
            var.member("set_update_interval").call(vec![interval]),
        ));
    }
    core.add(Expression::from(
        APP.member("register_component")
            .call(vec![Expression::from(var)]),
    ));
    Ok(())
}

/// Emits `var->set_parent(parent_)` once the parent ID is bound.
pub struct RegisterParented {
    var: MockObj,
    parent: Ident,
}

impl RegisterParented {
    pub fn new(var: MockObj, parent: Ident) -> Self {
        RegisterParented { var, parent }
    }
}

impl Coroutine for RegisterParented {
    type Output = ();

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<()>> {
        let Some(name) = self.parent.name() else {
            bail!("cannot wait on an ID that has not been resolved");
        };
        let Some((_, parent)) = core.get_variable(&name) else {
            return Ok(Resume::Pending(WaitOn::Variable(self.parent.clone())));
        };
        core.add(Expression::from(
            self.var
                .member("set_parent")
                .call(vec![Expression::from(parent)]),
        ));
        Ok(Resume::Ready(()))
    }

    fn describe(&self) -> String {
        format!("register_parented({})", self.parent)
    }
}

/// Resolves a value that may be either a literal or a lambda source.
///
/// Literals convert through [`safe_exp`] in one step. Lambda sources are
/// compiled with the given signature and suspend on any `id(...)` reference
/// they contain.
pub struct Templatable {
    value: Value,
    parameters: Vec<Parameter>,
    return_type: Option<Expression>,
    lambda: Option<ProcessLambda>,
}

impl Templatable {
    pub fn new(value: Value, parameters: Vec<Parameter>, return_type: Option<Expression>) -> Self {
        Templatable {
            value,
            parameters,
            return_type,
            lambda: None,
        }
    }
}

impl Coroutine for Templatable {
    type Output = Expression;

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<Expression>> {
        if let Value::Lambda(source) = &self.value {
            let lambda = self.lambda.get_or_insert_with(|| {
                ProcessLambda::new(source, self.parameters.clone(), self.return_type.clone())
            });
            return lambda.resume(core);
        }
        Ok(Resume::Ready(safe_exp(&self.value)?))
    }

    fn describe(&self) -> String {
        match &self.value {
            Value::Lambda(source) => format!("templatable({:?})", source.source()),
            other => format!("templatable({})", other.type_name()),
        }
    }
}
