/*!
Resolution of `id(...)` references inside user-written C++ snippets.

Validation only splits the snippet into literal and placeholder parts (see
`LambdaSource`); the coroutines here run at generation time and substitute
each placeholder once the referenced variable has been registered.
*/

use anyhow::bail;
use embergen_cpp::{Expression, Ident, LambdaExpr, MockObj, Parameter};
use embergen_schema::LambdaSource;

use crate::codegen::Codegen;
use crate::coroutine::{Coroutine, Resume, WaitOn};
use crate::cpp_types::GLOBAL_VAR;
use crate::errors::CodegenResult;

/// Waits until `id` has a registered variable, then yields its accessor.
pub struct GetVariable {
    id: Ident,
}

impl GetVariable {
    pub fn new(id: Ident) -> Self {
        GetVariable { id }
    }
}

impl Coroutine for GetVariable {
    type Output = MockObj;

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<MockObj>> {
        let Some(name) = self.id.name() else {
            bail!("cannot wait on an ID that has not been resolved");
        };
        match core.get_variable(&name) {
            Some((_, obj)) => Ok(Resume::Ready(obj)),
            None => Ok(Resume::Pending(WaitOn::Variable(self.id.clone()))),
        }
    }

    fn describe(&self) -> String {
        format!("get_variable({})", self.id)
    }
}

/// Like [`GetVariable`], but also yields the registered ID. The registered
/// ID carries the declared class, which the original reference may lack.
pub struct GetVariableWithFullId {
    id: Ident,
}

impl GetVariableWithFullId {
    pub fn new(id: Ident) -> Self {
        GetVariableWithFullId { id }
    }
}

impl Coroutine for GetVariableWithFullId {
    type Output = (Ident, MockObj);

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<(Ident, MockObj)>> {
        let Some(name) = self.id.name() else {
            bail!("cannot wait on an ID that has not been resolved");
        };
        match core.get_variable(&name) {
            Some(bound) => Ok(Resume::Ready(bound)),
            None => Ok(Resume::Pending(WaitOn::Variable(self.id.clone()))),
        }
    }

    fn describe(&self) -> String {
        format!("get_variable_with_full_id({})", self.id)
    }
}

/// Compiles a lambda source into a C++ lambda expression.
///
/// Each `id(name)` placeholder suspends generation until the named variable
/// is registered. The replacement depends on what the name turns out to be:
///
/// - an ID bound to a global-variable holder becomes `name_->value()`,
///   keeping any member access after it intact;
/// - `id(name).member` becomes `name_->member`, swallowing the dot;
/// - anything else becomes the variable accessor itself.
pub struct ProcessLambda {
    source: LambdaSource,
    parts: Vec<String>,
    resolved: Vec<Expression>,
    parameters: Vec<Parameter>,
    return_type: Option<Expression>,
    capture: String,
}

impl ProcessLambda {
    pub fn new(
        source: &LambdaSource,
        parameters: Vec<Parameter>,
        return_type: Option<Expression>,
    ) -> Self {
        ProcessLambda {
            parts: source.parts().to_vec(),
            source: source.clone(),
            resolved: Vec::new(),
            parameters,
            return_type,
            capture: "=".to_owned(),
        }
    }

    pub fn with_capture(mut self, capture: impl Into<String>) -> Self {
        self.capture = capture.into();
        self
    }

    fn assemble(&self) -> LambdaExpr {
        let mut resolved = self.resolved.iter();
        let mut parts = Vec::with_capacity(self.parts.len());
        for (i, part) in self.parts.iter().enumerate() {
            if i % 3 == 1 {
                if let Some(expression) = resolved.next() {
                    parts.push(expression.clone());
                }
            } else if !part.is_empty() {
                parts.push(Expression::raw(part.clone()));
            }
        }
        LambdaExpr {
            parts,
            parameters: self.parameters.clone(),
            capture: self.capture.clone(),
            return_type: self.return_type.clone().map(Box::new),
            source: self.source.location().cloned(),
        }
    }
}

impl Coroutine for ProcessLambda {
    type Output = Expression;

    fn resume(&mut self, core: &Codegen) -> CodegenResult<Resume<Expression>> {
        let requires = self.source.requires_ids();
        while self.resolved.len() < requires.len() {
            let id = &requires[self.resolved.len()];
            let Some(name) = id.name() else {
                bail!("lambda placeholders always carry a name");
            };
            let Some((bound_id, var)) = core.get_variable(&name) else {
                return Ok(Resume::Pending(WaitOn::Variable(id.clone())));
            };

            let placeholder = 1 + self.resolved.len() * 3;
            let has_trailing_dot = self.parts.get(placeholder + 1).is_some_and(|p| p == ".");
            let is_global = bound_id
                .class()
                .is_some_and(|class| class.inherits_from(&GLOBAL_VAR));

            let replacement = if is_global {
                Expression::from(var.member("value").call(vec![]))
            } else if has_trailing_dot {
                self.parts[placeholder + 1].clear();
                Expression::from(var.deref_member())
            } else {
                Expression::from(&var)
            };
            self.resolved.push(replacement);
        }

        Ok(Resume::Ready(Expression::Lambda(self.assemble())))
    }

    fn describe(&self) -> String {
        format!("process_lambda({:?})", self.source.source())
    }
}

pub fn process_lambda(
    source: &LambdaSource,
    parameters: Vec<Parameter>,
    return_type: Option<Expression>,
) -> ProcessLambda {
    ProcessLambda::new(source, parameters, return_type)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cpp_types::{EMBER_NS, FLOAT, GLOBAL_VAR};
    use embergen_cpp::MemberOp;
    use pretty_assertions::assert_eq;

    fn core_with(vars: &[(&str, bool)]) -> Codegen {
        let core = Codegen::new();
        for (name, global) in vars {
            let class = if *global {
                GLOBAL_VAR.template(vec![Expression::raw("int")])
            } else {
                EMBER_NS.class_("Sensor", &[])
            };
            let id = Ident::declared(*name, class);
            let obj = MockObj::new(Expression::raw(format!("{name}_")), MemberOp::Arrow);
            core.register_variable(&id, obj).unwrap();
        }
        core
    }

    fn compile(core: &Codegen, source: &str) -> LambdaExpr {
        let source = LambdaSource::new(source);
        let mut lambda = ProcessLambda::new(&source, vec![], None);
        match lambda.resume(core).unwrap() {
            Resume::Ready(Expression::Lambda(lambda)) => lambda,
            _ => panic!("expected the lambda to compile in one step"),
        }
    }

    #[test]
    fn member_access_uses_the_deref_spelling() {
        let core = core_with(&[("my_sensor", false)]);
        let lambda = compile(&core, "return id(my_sensor).state;");
        assert_eq!(lambda.content(), "return my_sensor_->state;");
    }

    #[test]
    fn bare_reference_becomes_the_accessor() {
        let core = core_with(&[("my_sensor", false)]);
        let lambda = compile(&core, "publish(id(my_sensor));");
        assert_eq!(lambda.content(), "publish(my_sensor_);");
    }

    #[test]
    fn global_variables_read_through_value() {
        let core = core_with(&[("counter", true)]);
        let lambda = compile(&core, "return id(counter) + 1;");
        assert_eq!(lambda.content(), "return counter_->value() + 1;");
    }

    #[test]
    fn global_variable_members_keep_the_dot() {
        let core = core_with(&[("counter", true)]);
        let lambda = compile(&core, "return id(counter).foo;");
        assert_eq!(lambda.content(), "return counter_->value().foo;");
    }

    #[test]
    fn multiple_ids_resolve_in_order() {
        let core = core_with(&[("a", false), ("b", false)]);
        let lambda = compile(&core, "return id(a).state + id(b).state;");
        assert_eq!(lambda.content(), "return a_->state + b_->state;");
    }

    #[test]
    fn unbound_ids_suspend_until_registered() {
        let core = Codegen::new();
        let source = LambdaSource::new("return id(late).state;");
        let mut lambda = ProcessLambda::new(&source, vec![], None);

        let Resume::Pending(WaitOn::Variable(id)) = lambda.resume(&core).unwrap() else {
            panic!("nothing is registered, the lambda must suspend");
        };
        assert_eq!(id.name().as_deref(), Some("late"));

        let class = EMBER_NS.class_("Sensor", &[]);
        core.register_variable(
            &Ident::declared("late", class),
            MockObj::new(Expression::raw("late_"), MemberOp::Arrow),
        )
        .unwrap();

        let Resume::Ready(Expression::Lambda(lambda)) = lambda.resume(&core).unwrap() else {
            panic!("the variable is registered now");
        };
        assert_eq!(lambda.content(), "return late_->state;");
    }

    #[test]
    fn get_variable_suspends_then_yields_the_accessor() {
        let core = Codegen::new();
        let class = EMBER_NS.class_("Sensor", &[]);
        let id = Ident::reference("target", class.clone());

        let mut get = GetVariable::new(id.clone());
        assert!(matches!(get.resume(&core).unwrap(), Resume::Pending(_)));

        core.register_variable(
            &Ident::declared("target", class),
            MockObj::new(Expression::raw("target_"), MemberOp::Arrow),
        )
        .unwrap();

        let Resume::Ready(obj) = get.resume(&core).unwrap() else {
            panic!("the variable is registered now");
        };
        assert_eq!(obj.to_string(), "target_");

        let mut full = GetVariableWithFullId::new(id);
        let Resume::Ready((bound, _)) = full.resume(&core).unwrap() else {
            panic!("the variable is registered now");
        };
        assert!(bound.class().is_some());
    }

    #[test]
    fn parameters_and_return_type_carry_through() {
        let core = core_with(&[]);
        let source = LambdaSource::new("return x * 2.0f;");
        let mut lambda = ProcessLambda::new(
            &source,
            vec![Parameter::new(Expression::from(&*FLOAT), "x")],
            Some(Expression::from(&*FLOAT)),
        );

        let Resume::Ready(expression) = lambda.resume(&core).unwrap() else {
            panic!("no placeholders to wait for");
        };
        assert_eq!(
            expression.to_string(),
            "[=](float x) -> float {\nreturn x * 2.0f;\n}"
        );
    }
}
