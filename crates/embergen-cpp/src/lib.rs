//! The C++ side of embergen: identifier handles, a small expression and
//! statement model that renders to source text, and the mock object proxy
//! used to build member accesses, calls, and type names without a real C++
//! type system.

pub mod expr;
pub mod ident;
pub mod mock;

pub use expr::{Expression, LambdaExpr, Parameter, SourceLocation, Statement, cpp_string_escape};
pub use ident::{Ident, RESERVED_IDENTIFIERS, ensure_unique_string};
pub use mock::{MemberOp, MockObj, MockObjClass};
