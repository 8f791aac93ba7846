use std::fmt;
use std::fmt::Write;

use embergen_util::indent::indent_all_but_first_and_last;
use itertools::Itertools;

/// Escapes a string for use as a C string literal, quotes included.
///
/// Anything outside printable ASCII is emitted as a three-digit octal escape,
/// as are the quote and backslash characters. Escaping bytes rather than code
/// points keeps the generated file pure ASCII regardless of the input.
pub fn cpp_string_escape(string: &str) -> String {
    let mut result = String::with_capacity(string.len() + 2);
    result.push('"');
    for byte in string.bytes() {
        if !(32..127).contains(&byte) || byte == b'"' || byte == b'\\' {
            let _ = write!(result, "\\{byte:03o}");
        } else {
            result.push(byte as char);
        }
    }
    result.push('"');
    result
}

/// A location in the source document a generated fragment came from, emitted
/// as a `#line` directive so compiler errors point back at the user's input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }

    pub fn as_line_directive(&self) -> String {
        format!("#line {} \"{}\"", self.line, self.file)
    }
}

/// One parameter of a generated lambda, e.g. `float x`.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub type_: Expression,
    pub name: String,
}

impl Parameter {
    pub fn new(type_: Expression, name: impl Into<String>) -> Self {
        Parameter {
            type_,
            name: name.into(),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_, self.name)
    }
}

/// A C++ lambda: capture list, parameters, optional return type, and a body
/// assembled from interleaved literal and substituted parts.
#[derive(Clone, Debug, PartialEq)]
pub struct LambdaExpr {
    pub parts: Vec<Expression>,
    pub parameters: Vec<Parameter>,
    pub capture: String,
    pub return_type: Option<Box<Expression>>,
    pub source: Option<SourceLocation>,
}

impl LambdaExpr {
    pub fn content(&self) -> String {
        self.parts.iter().map(ToString::to_string).join("")
    }
}

impl fmt::Display for LambdaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self.parameters.iter().map(ToString::to_string).join(", ");
        write!(f, "[{}]({})", self.capture, parameters)?;
        if let Some(return_type) = &self.return_type {
            write!(f, " -> {return_type}")?;
        }
        f.write_str(" {\n")?;
        if let Some(source) = &self.source {
            writeln!(f, "{}", source.as_line_directive())?;
        }
        write!(f, "{}\n}}", self.content())
    }
}

/// A C++ expression fragment. Every variant renders to a syntactically
/// complete piece of source; none of them end in a semicolon.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// Verbatim text, already valid C++.
    Raw(String),
    StringLiteral(String),
    BoolLiteral(bool),
    /// Renders with a `UL`/`ULL`/`LL` suffix when the value does not fit in
    /// a plain `int` literal.
    IntLiteral(i64),
    FloatLiteral(f64),
    HexIntLiteral(u64),
    /// `type mod target = rhs` when a declaring type is present, otherwise
    /// a plain `target = rhs`.
    Assignment {
        declared: Option<(Box<Expression>, &'static str)>,
        target: Box<Expression>,
        rhs: Box<Expression>,
    },
    /// `type mod name`, used for forward declarations in the global section.
    VariableDeclaration {
        type_: Box<Expression>,
        modifier: &'static str,
        name: String,
    },
    ExpressionList(Vec<Expression>),
    TemplateArguments(Vec<Expression>),
    Call {
        callee: Box<Expression>,
        template_args: Option<Vec<Expression>>,
        args: Vec<Expression>,
    },
    /// Designated-initializer syntax: `base{ .key = value, }`. Keys keep
    /// their insertion order.
    StructInitializer {
        base: Box<Expression>,
        args: Vec<(String, Expression)>,
    },
    ArrayInitializer {
        args: Vec<Expression>,
        multiline: bool,
    },
    Lambda(LambdaExpr),
    /// `static const type name[] = rhs`, optionally tagged PROGMEM.
    StaticArrayAssignment {
        type_: Box<Expression>,
        name: String,
        rhs: Box<Expression>,
        progmem: bool,
    },
}

impl Expression {
    pub fn raw(text: impl Into<String>) -> Self {
        Expression::Raw(text.into())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Raw(text) => f.write_str(text),
            Expression::StringLiteral(s) => f.write_str(&cpp_string_escape(s)),
            Expression::BoolLiteral(b) => f.write_str(if *b { "true" } else { "false" }),
            Expression::IntLiteral(i) => {
                if *i > 4294967295 {
                    write!(f, "{i}ULL")
                } else if *i > 2147483647 {
                    write!(f, "{i}UL")
                } else if *i < -2147483648 {
                    write!(f, "{i}LL")
                } else {
                    write!(f, "{i}")
                }
            }
            Expression::FloatLiteral(value) => {
                if value.is_nan() {
                    f.write_str("NAN")
                } else if value.fract() == 0.0 {
                    write!(f, "{value:.1}f")
                } else {
                    write!(f, "{value}f")
                }
            }
            Expression::HexIntLiteral(i) => write!(f, "0x{i:02X}"),
            Expression::Assignment {
                declared,
                target,
                rhs,
            } => match declared {
                Some((type_, modifier)) => write!(f, "{type_} {modifier}{target} = {rhs}"),
                None => write!(f, "{target} = {rhs}"),
            },
            Expression::VariableDeclaration {
                type_,
                modifier,
                name,
            } => write!(f, "{type_} {modifier}{name}"),
            Expression::ExpressionList(args) => {
                let text = args.iter().map(ToString::to_string).join(", ");
                f.write_str(&indent_all_but_first_and_last(&text))
            }
            Expression::TemplateArguments(args) => {
                write!(f, "<{}>", args.iter().map(ToString::to_string).join(", "))
            }
            Expression::Call {
                callee,
                template_args,
                args,
            } => {
                write!(f, "{callee}")?;
                if let Some(template_args) = template_args {
                    write!(
                        f,
                        "<{}>",
                        template_args.iter().map(ToString::to_string).join(", ")
                    )?;
                }
                let args = Expression::ExpressionList(args.clone());
                write!(f, "({args})")
            }
            Expression::StructInitializer { base, args } => {
                write!(f, "{base}{{\n")?;
                for (key, value) in args {
                    writeln!(f, "  .{key} = {value},")?;
                }
                f.write_str("}")
            }
            Expression::ArrayInitializer { args, multiline } => {
                if args.is_empty() {
                    return f.write_str("{}");
                }
                if *multiline {
                    f.write_str("{\n")?;
                    for arg in args {
                        writeln!(f, "  {arg},")?;
                    }
                    f.write_str("}")
                } else {
                    write!(f, "{{{}}}", args.iter().map(ToString::to_string).join(", "))
                }
            }
            Expression::Lambda(lambda) => lambda.fmt(f),
            Expression::StaticArrayAssignment {
                type_,
                name,
                rhs,
                progmem,
            } => {
                if *progmem {
                    write!(f, "static const {type_} {name}[] PROGMEM = {rhs}")
                } else {
                    write!(f, "static const {type_} {name}[] = {rhs}")
                }
            }
        }
    }
}

/// A single line (or block) of generated code in the setup or global section.
#[derive(Clone, Debug)]
pub enum Statement {
    Raw(String),
    Expression(Expression),
    LineComment(String),
}

impl Statement {
    pub fn raw(text: impl Into<String>) -> Self {
        Statement::Raw(text.into())
    }
}

impl From<Expression> for Statement {
    fn from(expression: Expression) -> Self {
        Statement::Expression(expression)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Raw(text) => f.write_str(text),
            Statement::Expression(expression) => write!(f, "{expression};"),
            Statement::LineComment(text) => {
                let commented = text.split('\n').map(|line| format!("// {line}")).join("\n");
                f.write_str(&commented)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(e: Expression) -> String {
        e.to_string()
    }

    #[test]
    fn int_literal_suffixes() {
        assert_eq!(render(Expression::IntLiteral(0)), "0");
        assert_eq!(render(Expression::IntLiteral(2147483647)), "2147483647");
        assert_eq!(render(Expression::IntLiteral(2147483648)), "2147483648UL");
        assert_eq!(render(Expression::IntLiteral(4294967295)), "4294967295UL");
        assert_eq!(render(Expression::IntLiteral(4294967296)), "4294967296ULL");
        assert_eq!(render(Expression::IntLiteral(-2147483648)), "-2147483648");
        assert_eq!(render(Expression::IntLiteral(-2147483649)), "-2147483649LL");
    }

    #[test]
    fn float_literals() {
        assert_eq!(render(Expression::FloatLiteral(f64::NAN)), "NAN");
        assert_eq!(render(Expression::FloatLiteral(1.0)), "1.0f");
        assert_eq!(render(Expression::FloatLiteral(0.5)), "0.5f");
        assert_eq!(render(Expression::FloatLiteral(-3.25)), "-3.25f");
        assert_eq!(render(Expression::FloatLiteral(0.0)), "0.0f");
    }

    #[test]
    fn hex_literals_pad_to_two_digits() {
        assert_eq!(render(Expression::HexIntLiteral(10)), "0x0A");
        assert_eq!(render(Expression::HexIntLiteral(0)), "0x00");
        assert_eq!(render(Expression::HexIntLiteral(255)), "0xFF");
        assert_eq!(render(Expression::HexIntLiteral(511)), "0x1FF");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(cpp_string_escape("hello"), "\"hello\"");
        assert_eq!(cpp_string_escape("he\"llo"), "\"he\\042llo\"");
        assert_eq!(cpp_string_escape("back\\slash"), "\"back\\134slash\"");
        assert_eq!(cpp_string_escape("line\nbreak"), "\"line\\012break\"");
        assert_eq!(cpp_string_escape("a\0b"), "\"a\\000b\"");
        // u-umlaut is two UTF-8 bytes, each escaped separately
        assert_eq!(cpp_string_escape("\u{fc}"), "\"\\303\\274\"");
    }

    #[test]
    fn struct_initializer_layout() {
        let init = Expression::StructInitializer {
            base: Box::new(Expression::raw("PinConfig")),
            args: vec![
                ("pin".to_string(), Expression::IntLiteral(4)),
                ("inverted".to_string(), Expression::BoolLiteral(true)),
            ],
        };
        assert_eq!(
            render(init),
            "PinConfig{\n  .pin = 4,\n  .inverted = true,\n}"
        );
    }

    #[test]
    fn array_initializer_layout() {
        let empty = Expression::ArrayInitializer {
            args: vec![],
            multiline: true,
        };
        assert_eq!(render(empty), "{}");

        let flat = Expression::ArrayInitializer {
            args: vec![Expression::IntLiteral(1), Expression::IntLiteral(2)],
            multiline: false,
        };
        assert_eq!(render(flat), "{1, 2}");

        let tall = Expression::ArrayInitializer {
            args: vec![Expression::IntLiteral(1), Expression::IntLiteral(2)],
            multiline: true,
        };
        assert_eq!(render(tall), "{\n  1,\n  2,\n}");
    }

    #[test]
    fn call_with_template_args() {
        let call = Expression::Call {
            callee: Box::new(Expression::raw("make_unique")),
            template_args: Some(vec![Expression::raw("Sensor")]),
            args: vec![Expression::IntLiteral(1)],
        };
        assert_eq!(render(call), "make_unique<Sensor>(1)");
    }

    #[test]
    fn assignment_forms() {
        let typed = Expression::Assignment {
            declared: Some((Box::new(Expression::raw("Sensor")), "*")),
            target: Box::new(Expression::raw("sensor_")),
            rhs: Box::new(Expression::raw("new Sensor()")),
        };
        assert_eq!(render(typed), "Sensor *sensor_ = new Sensor()");

        let untyped = Expression::Assignment {
            declared: None,
            target: Box::new(Expression::raw("sensor_")),
            rhs: Box::new(Expression::raw("new Sensor()")),
        };
        assert_eq!(render(untyped), "sensor_ = new Sensor()");
    }

    #[test]
    fn lambda_rendering() {
        let lambda = Expression::Lambda(LambdaExpr {
            parts: vec![Expression::raw("return x * 2;")],
            parameters: vec![Parameter::new(Expression::raw("float"), "x")],
            capture: "=".to_string(),
            return_type: Some(Box::new(Expression::raw("float"))),
            source: None,
        });
        assert_eq!(render(lambda), "[=](float x) -> float {\nreturn x * 2;\n}");
    }

    #[test]
    fn lambda_with_line_directive() {
        let lambda = Expression::Lambda(LambdaExpr {
            parts: vec![Expression::raw("return 1;")],
            parameters: vec![],
            capture: "=".to_string(),
            return_type: None,
            source: Some(SourceLocation::new("device.yaml", 12)),
        });
        assert_eq!(
            render(lambda),
            "[=]() {\n#line 12 \"device.yaml\"\nreturn 1;\n}"
        );
    }

    #[test]
    fn statement_forms() {
        let stmt: Statement = Expression::raw("App.setup()").into();
        assert_eq!(stmt.to_string(), "App.setup();");
        assert_eq!(
            Statement::LineComment("first\nsecond".to_string()).to_string(),
            "// first\n// second"
        );
        assert_eq!(Statement::raw("#define FOO").to_string(), "#define FOO");
    }
}
