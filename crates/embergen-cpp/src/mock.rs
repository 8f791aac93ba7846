use std::fmt;
use std::ops::Deref;

use crate::expr::Expression;

/// The operator used to reach members of a mock object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberOp {
    /// No operator; the object is a bare token like the global namespace.
    None,
    Dot,
    Arrow,
    Scope,
}

impl MemberOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberOp::None => "",
            MemberOp::Dot => ".",
            MemberOp::Arrow => "->",
            MemberOp::Scope => "::",
        }
    }
}

/// A stand-in for a C++ value or type. It knows nothing about the real C++
/// entity; it only accumulates the spelling of an access path plus the
/// operator future accesses should use.
///
/// Displaying a mock object prints the accumulated base and never the
/// pending operator.
#[derive(Clone, Debug)]
pub struct MockObj {
    base: Expression,
    op: MemberOp,
}

impl MockObj {
    pub fn new(base: Expression, op: MemberOp) -> Self {
        MockObj { base, op }
    }

    /// The root every fully qualified name hangs off.
    pub fn global_namespace() -> Self {
        MockObj::new(Expression::raw(""), MemberOp::None)
    }

    pub fn op(&self) -> MemberOp {
        self.op
    }

    pub fn base(&self) -> &Expression {
        &self.base
    }

    fn joined(&self, suffix: &str) -> String {
        format!("{}{}{}", self.base, self.op.as_str(), suffix)
    }

    /// Accesses a member. Two naming conventions apply: a leading `P` marks
    /// the member as a pointer (subsequent accesses use `->`), and a leading
    /// underscore is stripped from the emitted name.
    pub fn member(&self, name: &str) -> MockObj {
        let mut next_op = MemberOp::Dot;
        let mut name = name;
        if let Some(stripped) = name.strip_prefix('P') {
            if !matches!(self.op, MemberOp::Scope | MemberOp::None) {
                name = stripped;
                next_op = MemberOp::Arrow;
            }
        }
        let name = name.strip_prefix('_').unwrap_or(name);
        MockObj::new(Expression::Raw(self.joined(name)), next_op)
    }

    /// The access path with its operator appended and nothing after it, e.g.
    /// `sensor_->`. Lambdas use this when a placeholder is followed by a dot.
    pub fn deref_member(&self) -> MockObj {
        MockObj::new(
            Expression::Raw(format!("{}{}", self.base, self.op.as_str())),
            MemberOp::Dot,
        )
    }

    pub fn call(&self, args: Vec<Expression>) -> MockObj {
        MockObj::new(
            Expression::Call {
                callee: Box::new(self.base.clone()),
                template_args: None,
                args,
            },
            self.op,
        )
    }

    pub fn call_template(&self, template_args: Vec<Expression>, args: Vec<Expression>) -> MockObj {
        MockObj::new(
            Expression::Call {
                callee: Box::new(self.base.clone()),
                template_args: Some(template_args),
                args,
            },
            self.op,
        )
    }

    pub fn index(&self, item: Expression) -> MockObj {
        MockObj::new(Expression::Raw(format!("{}[{item}]", self.base)), MemberOp::Dot)
    }

    /// Appends explicit template arguments, e.g. `std::vector<uint8_t>`.
    pub fn template(&self, args: Vec<Expression>) -> MockObj {
        let rendered = Expression::TemplateArguments(args);
        MockObj::new(
            Expression::Raw(format!("{}{rendered}", self.base)),
            MemberOp::Dot,
        )
    }

    pub fn namespace(&self, name: &str) -> MockObj {
        MockObj::new(
            Expression::Raw(format!("{}{}{name}", self.base, self.op.as_str())),
            MemberOp::Scope,
        )
    }

    fn qualified(&self, name: &str) -> String {
        let sep = match self.op {
            MemberOp::None => "",
            _ => "::",
        };
        format!("{}{sep}{name}", self.base)
    }

    pub fn class_(&self, name: &str, parents: &[MockObjClass]) -> MockObjClass {
        MockObjClass::new(
            MockObj::new(Expression::Raw(self.qualified(name)), MemberOp::Dot),
            parents,
        )
    }

    pub fn struct_(&self, name: &str) -> MockObjClass {
        self.class_(name, &[])
    }

    /// Refers to an enum type nested in this scope. Values of a scoped enum
    /// are reached through the enum's own name; plain enum values live in
    /// the enclosing scope.
    pub fn enum_(&self, name: &str, is_class: bool) -> MockObj {
        if is_class {
            MockObj::new(Expression::Raw(self.qualified(name)), MemberOp::Scope)
        } else {
            MockObj::new(Expression::Raw(self.qualified(name)), self.op)
        }
    }

    pub fn new_(&self) -> MockObj {
        MockObj::new(
            Expression::Raw(format!("new {}", self.base)),
            MemberOp::Arrow,
        )
    }

    pub fn ref_(&self) -> MockObj {
        MockObj::new(Expression::Raw(format!("{} &", self.base)), MemberOp::None)
    }

    pub fn ptr(&self) -> MockObj {
        MockObj::new(Expression::Raw(format!("{} *", self.base)), MemberOp::None)
    }

    pub fn const_ptr(&self) -> MockObj {
        MockObj::new(
            Expression::Raw(format!("{} *const", self.base)),
            MemberOp::None,
        )
    }

    pub fn const_(&self) -> MockObj {
        MockObj::new(Expression::Raw(format!("const {}", self.base)), self.op)
    }

    /// A `using namespace` directive for this namespace.
    pub fn using_(&self) -> MockObj {
        debug_assert!(matches!(self.op, MemberOp::Scope));
        MockObj::new(
            Expression::Raw(format!("using namespace {}", self.base)),
            MemberOp::None,
        )
    }
}

impl fmt::Display for MockObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.fmt(f)
    }
}

impl From<MockObj> for Expression {
    fn from(obj: MockObj) -> Self {
        obj.base
    }
}

impl From<&MockObj> for Expression {
    fn from(obj: &MockObj) -> Self {
        obj.base.clone()
    }
}

/// A mock object that stands for a class. It additionally carries the
/// transitive list of parent classes so generated code can ask about
/// inheritance, which the lambda engine uses to special-case global
/// variables.
#[derive(Clone, Debug)]
pub struct MockObjClass {
    obj: MockObj,
    parents: Vec<MockObjClass>,
}

impl MockObjClass {
    pub fn new(obj: MockObj, parents: &[MockObjClass]) -> Self {
        let mut all = Vec::new();
        for parent in parents {
            all.push(parent.clone());
            all.extend(parent.parents.iter().cloned());
        }
        MockObjClass { obj, parents: all }
    }

    /// Whether this class is `other` or lists it among its ancestors.
    /// Comparison is by rendered name, like everything else in this model.
    pub fn inherits_from(&self, other: &MockObjClass) -> bool {
        let other = other.to_string();
        if self.to_string() == other {
            return true;
        }
        self.parents.iter().any(|p| p.to_string() == other)
    }

    /// Instantiates the class template. The instance keeps the full parent
    /// chain and adds the uninstantiated class itself, so
    /// `Foo<int>` inherits from `Foo`.
    pub fn template(&self, args: Vec<Expression>) -> MockObjClass {
        let rendered = Expression::TemplateArguments(args);
        let mut parents = self.parents.clone();
        parents.push(self.clone());
        MockObjClass {
            obj: MockObj::new(
                Expression::Raw(format!("{}{rendered}", self.obj.base)),
                MemberOp::Dot,
            ),
            parents,
        }
    }

    pub fn as_obj(&self) -> &MockObj {
        &self.obj
    }
}

impl Deref for MockObjClass {
    type Target = MockObj;

    fn deref(&self) -> &Self::Target {
        &self.obj
    }
}

impl fmt::Display for MockObjClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.obj.fmt(f)
    }
}

impl From<&MockObjClass> for Expression {
    fn from(class: &MockObjClass) -> Self {
        class.obj.base.clone()
    }
}
