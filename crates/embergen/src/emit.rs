/*!
Rendering of an accumulated program into the artifacts a build driver
writes to disk: the C++ translation unit, the defines header, and the
build manifest.
*/

use std::fmt::{self, Write};

use embergen_util::indent::indent;
use itertools::Itertools;

use crate::codegen::Codegen;
use crate::generate::Target;

/// Everything one pass produces.
#[derive(Clone, Debug)]
pub struct Artifacts {
    /// The generated translation unit: includes and globals, then `setup()`
    /// and `loop()`.
    pub cpp_source: String,
    /// A header with one `#define` per line, sorted by name.
    pub defines_header: String,
    /// Library, flag, and define listing for the build system.
    pub manifest: Manifest,
    /// Integration names the pass loaded, for downstream diagnostics.
    pub loaded_integrations: Vec<String>,
}

/// The build-facing summary of a pass. `Display` renders it as a
/// platformio-style environment section.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    pub board: String,
    pub platform: String,
    pub framework: String,
    pub libraries: Vec<String>,
    pub build_flags: Vec<String>,
    pub defines: Vec<String>,
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[env:embergen]")?;
        writeln!(f, "board = {}", self.board)?;
        writeln!(f, "platform = {}", self.platform)?;
        writeln!(f, "framework = {}", self.framework)?;
        if !self.libraries.is_empty() {
            writeln!(f, "lib_deps =")?;
            for library in &self.libraries {
                writeln!(f, "  {library}")?;
            }
        }
        if !self.build_flags.is_empty() {
            writeln!(f, "build_flags =")?;
            for flag in &self.build_flags {
                writeln!(f, "  {flag}")?;
            }
        }
        Ok(())
    }
}

/// Renders the translation unit. Include paths wrapped in `<...>` stay
/// angle-bracketed; everything else is quoted.
pub fn render_cpp_source(core: &Codegen) -> String {
    let mut out = String::new();
    out.push_str("// Generated by embergen; do not edit.\n");
    out.push_str("#include \"ember/application.h\"\n");
    for include in core.includes() {
        if include.starts_with('<') {
            let _ = writeln!(out, "#include {include}");
        } else {
            let _ = writeln!(out, "#include \"{include}\"");
        }
    }
    out.push('\n');
    out.push_str("using namespace ember;\n");

    let globals = core.global_statements();
    if !globals.is_empty() {
        out.push('\n');
        for statement in &globals {
            let _ = writeln!(out, "{statement}");
        }
    }

    out.push('\n');
    out.push_str("void setup() {\n");
    let main = core.main_statements();
    if !main.is_empty() {
        let body = main.iter().map(ToString::to_string).join("\n");
        let _ = writeln!(out, "{}", indent(&body));
    }
    out.push_str("  App.setup();\n");
    out.push_str("}\n\n");
    out.push_str("void loop() {\n  App.loop();\n}\n");
    out
}

pub fn render_defines_header(core: &Codegen) -> String {
    let mut defines = core.defines();
    defines.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::from("#pragma once\n\n");
    for (name, value) in &defines {
        match value {
            Some(value) => {
                let _ = writeln!(out, "#define {name} {value}");
            }
            None => {
                let _ = writeln!(out, "#define {name}");
            }
        }
    }
    out
}

pub fn render_manifest(core: &Codegen, target: &Target) -> Manifest {
    let defines = core
        .defines()
        .into_iter()
        .map(|(name, value)| match value {
            Some(value) => format!("{name}={value}"),
            None => name,
        })
        .collect();

    Manifest {
        board: target.board.clone(),
        platform: target.mcu.as_str().to_owned(),
        framework: target.toolchain.clone(),
        libraries: core.libraries().iter().map(ToString::to_string).collect(),
        build_flags: core.build_flags(),
        defines,
    }
}
