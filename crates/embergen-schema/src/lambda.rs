use embergen_cpp::{Ident, SourceLocation};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ID_PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"id\(\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\)(\.?)").unwrap());

// Comments are replaced with a space; string and char literals are kept so
// comment markers inside them survive. https://stackoverflow.com/a/241506
static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ms)//.*?$|/\*.*?\*/|'(?:\\.|[^\\'])*'|"(?:\\.|[^\\"])*""#).unwrap()
});

fn strip_comments(source: &str) -> String {
    COMMENT_REGEX
        .replace_all(source, |caps: &Captures| {
            let matched = caps.get(0).unwrap().as_str();
            if matched.starts_with('/') {
                " ".to_string()
            } else {
                matched.to_string()
            }
        })
        .into_owned()
}

/// A user-written C++ snippet with `id(...)` placeholders.
///
/// The snippet is scanned once at construction into the part list the
/// cross-reference engine consumes: literal text and placeholders alternate
/// as `[literal, name, dot-or-empty, literal, name, dot-or-empty, ...,
/// literal]`. Placeholders inside comments do not count; the whole comment is
/// gone by the time the scan runs.
#[derive(Clone, Debug)]
pub struct LambdaSource {
    source: String,
    parts: Vec<String>,
    location: Option<SourceLocation>,
}

impl LambdaSource {
    pub fn new(source: impl Into<String>) -> Self {
        LambdaSource::build(source.into(), None)
    }

    pub fn with_location(source: impl Into<String>, location: SourceLocation) -> Self {
        LambdaSource::build(source.into(), Some(location))
    }

    fn build(source: String, location: Option<SourceLocation>) -> Self {
        let stripped = strip_comments(&source);
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in ID_PLACEHOLDER_REGEX.captures_iter(&stripped) {
            let all = caps.get(0).unwrap();
            parts.push(stripped[last..all.start()].to_string());
            parts.push(caps[1].to_string());
            parts.push(caps[2].to_string());
            last = all.end();
        }
        parts.push(stripped[last..].to_string());

        LambdaSource {
            source,
            parts,
            location,
        }
    }

    /// The snippet as written, comments included.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// The identifiers this snippet references, in order of appearance.
    pub fn requires_ids(&self) -> Vec<Ident> {
        self.parts
            .iter()
            .skip(1)
            .step_by(3)
            .map(Ident::new)
            .collect()
    }
}

impl PartialEq for LambdaSource {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.location == other.location
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_into_interleaved_parts() {
        let lambda = LambdaSource::new("return id(x).state + id( y );");
        assert_eq!(
            lambda.parts(),
            ["return ", "x", ".", "state + ", "y", "", ";"]
        );
        let names: Vec<String> = lambda
            .requires_ids()
            .iter()
            .filter_map(Ident::name)
            .collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[test]
    fn no_placeholders_is_one_literal() {
        let lambda = LambdaSource::new("return 42;");
        assert_eq!(lambda.parts(), ["return 42;"]);
        assert!(lambda.requires_ids().is_empty());
    }

    #[test]
    fn commented_out_ids_are_not_references() {
        let lambda = LambdaSource::new("// id(phantom)\nreturn id(real);");
        let names: Vec<String> = lambda
            .requires_ids()
            .iter()
            .filter_map(Ident::name)
            .collect();
        assert_eq!(names, ["real"]);

        let block = LambdaSource::new("/* id(gone)\n   id(also_gone) */ return 1;");
        assert!(block.requires_ids().is_empty());
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let lambda = LambdaSource::new("auto url = \"http://host\"; return id(x);");
        let names: Vec<String> = lambda
            .requires_ids()
            .iter()
            .filter_map(Ident::name)
            .collect();
        assert_eq!(names, ["x"]);
        // the string literal survives comment stripping
        assert!(lambda.parts()[0].contains("http://host"));
    }

    #[test]
    fn malformed_placeholders_stay_literal() {
        let lambda = LambdaSource::new("id(9bad) id()");
        assert!(lambda.requires_ids().is_empty());
        assert_eq!(lambda.parts(), ["id(9bad) id()"]);
    }

    #[test]
    fn source_is_preserved_verbatim() {
        let src = "// note\nreturn id(x);";
        let lambda = LambdaSource::new(src);
        assert_eq!(lambda.source(), src);
    }
}
