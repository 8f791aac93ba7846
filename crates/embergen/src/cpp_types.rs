//! Handles for the C++ entities the framework ships. Builders reference
//! these instead of spelling out qualified names.

use embergen_cpp::{Expression, MemberOp, MockObj, MockObjClass};
use once_cell::sync::Lazy;

fn plain_type(name: &str) -> MockObj {
    MockObj::new(Expression::raw(name), MemberOp::None)
}

pub static GLOBAL_NS: Lazy<MockObj> = Lazy::new(MockObj::global_namespace);

/// The application singleton, `App` in generated code.
pub static APP: Lazy<MockObj> = Lazy::new(|| GLOBAL_NS.member("App"));

pub static EMBER_NS: Lazy<MockObj> = Lazy::new(|| GLOBAL_NS.namespace("ember"));
pub static GPIO_NS: Lazy<MockObj> = Lazy::new(|| EMBER_NS.namespace("gpio"));
pub static STD_NS: Lazy<MockObj> = Lazy::new(|| GLOBAL_NS.namespace("std"));

pub static COMPONENT: Lazy<MockObjClass> = Lazy::new(|| EMBER_NS.class_("Component", &[]));
pub static POLLING_COMPONENT: Lazy<MockObjClass> =
    Lazy::new(|| EMBER_NS.class_("PollingComponent", &[COMPONENT.clone()]));
pub static GPIO_PIN: Lazy<MockObjClass> = Lazy::new(|| EMBER_NS.class_("GPIOPin", &[]));
pub static INTERNAL_GPIO_PIN: Lazy<MockObjClass> =
    Lazy::new(|| EMBER_NS.class_("InternalGPIOPin", &[GPIO_PIN.clone()]));

/// Base for the templated holder `globals:` entries compile to. The lambda
/// engine treats IDs bound to subclasses of this specially.
pub static GLOBAL_VAR: Lazy<MockObjClass> =
    Lazy::new(|| EMBER_NS.class_("GlobalVariableComponent", &[COMPONENT.clone()]));

pub static ACTION: Lazy<MockObjClass> = Lazy::new(|| EMBER_NS.class_("Action", &[]));
pub static CONDITION: Lazy<MockObjClass> = Lazy::new(|| EMBER_NS.class_("Condition", &[]));
pub static LAMBDA_ACTION: Lazy<MockObjClass> =
    Lazy::new(|| EMBER_NS.class_("LambdaAction", &[ACTION.clone()]));
pub static LAMBDA_CONDITION: Lazy<MockObjClass> =
    Lazy::new(|| EMBER_NS.class_("LambdaCondition", &[CONDITION.clone()]));

pub static STD_STRING: Lazy<MockObjClass> = Lazy::new(|| STD_NS.class_("string", &[]));
pub static STD_VECTOR: Lazy<MockObjClass> = Lazy::new(|| STD_NS.class_("vector", &[]));

pub static VOID: Lazy<MockObj> = Lazy::new(|| plain_type("void"));
pub static NULLPTR: Lazy<MockObj> = Lazy::new(|| plain_type("nullptr"));
pub static BOOL: Lazy<MockObj> = Lazy::new(|| plain_type("bool"));
pub static INT: Lazy<MockObj> = Lazy::new(|| plain_type("int"));
pub static FLOAT: Lazy<MockObj> = Lazy::new(|| plain_type("float"));
pub static DOUBLE: Lazy<MockObj> = Lazy::new(|| plain_type("double"));
pub static INT32: Lazy<MockObj> = Lazy::new(|| plain_type("int32_t"));
pub static UINT8: Lazy<MockObj> = Lazy::new(|| plain_type("uint8_t"));
pub static UINT16: Lazy<MockObj> = Lazy::new(|| plain_type("uint16_t"));
pub static UINT32: Lazy<MockObj> = Lazy::new(|| plain_type("uint32_t"));
pub static SIZE_T: Lazy<MockObj> = Lazy::new(|| plain_type("size_t"));
pub static CONST_CHAR_PTR: Lazy<MockObj> = Lazy::new(|| plain_type("const char *"));
