use itertools::Itertools;

/// Prefixes every line of `text` with two spaces. Empty lines stay empty.
pub fn indent(text: &str) -> String {
    indent_with(text, "  ")
}

pub fn indent_with(text: &str, padding: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{padding}{line}")
            }
        })
        .join("\n")
}

/// Indents the interior lines of a multi-line fragment, leaving the first and
/// last lines alone. Used when a rendered expression is embedded mid-line.
pub fn indent_all_but_first_and_last(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= 2 {
        return text.to_string();
    }

    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || i == last || line.is_empty() {
                (*line).to_string()
            } else {
                format!("  {line}")
            }
        })
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn indents_every_line() {
        assert_eq!(indent("a\nb"), "  a\n  b");
    }

    #[test]
    fn empty_lines_left_alone() {
        assert_eq!(indent("a\n\nb"), "  a\n\n  b");
    }

    #[test]
    fn interior_only() {
        assert_eq!(
            indent_all_but_first_and_last("foo {\n.a = 1,\n.b = 2,\n}"),
            "foo {\n  .a = 1,\n  .b = 2,\n}"
        );
        assert_eq!(indent_all_but_first_and_last("one\ntwo"), "one\ntwo");
        assert_eq!(indent_all_but_first_and_last("single"), "single");
    }
}
