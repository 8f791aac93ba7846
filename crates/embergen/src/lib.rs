/*!
Code generation core. A validated configuration tree goes in; C++ source
text, a defines header and a build manifest come out.

The pieces, roughly in the order a generation pass touches them:

- [`registry`] holds the process-wide tables of integrations, platforms,
  pins, actions and conditions, each entry pairing a schema with a builder.
- [`codegen`] is the accumulator every builder writes into, plus the
  cooperative scheduler that runs builders in priority order.
- [`cgen`] has the helpers builders call: `safe_exp`, variable declaration,
  component registration.
- [`lambda`] resolves `id(...)` references inside user-written C++ snippets.
- [`generate`] drives a full pass and [`emit`] serializes the result.
*/

pub mod cgen;
pub mod codegen;
pub mod coroutine;
pub mod cpp_types;
pub mod emit;
pub mod errors;
pub mod generate;
pub mod lambda;
pub mod registry;

pub use codegen::{Codegen, Library};
pub use emit::{Artifacts, Manifest};
pub use errors::{CodegenError, CodegenResult};
pub use generate::{Target, generate};
pub use registry::{bootstrap, Registries};
