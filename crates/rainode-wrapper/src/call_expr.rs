//! Builds a canonical JavaScript call expression from bang-style input.
//!
//! Host commands arrive as `name arg1 "arg two" 3.5`. This module turns them
//! into `name("arg1", "arg two", 3.5)` so the wrapper can resolve the name
//! against the script's exported function table. Input that already looks
//! like a call expression (contains both parentheses) passes through
//! untouched for backward-compatible dotted/complex forms.

/// Turn a bang-style invocation into a canonical call expression.
///
/// Returns an empty string for blank input.
pub fn build_call_expression(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if trimmed.contains('(') && trimmed.contains(')') {
        return trimmed.to_string();
    }

    match trimmed.split_once(char::is_whitespace) {
        None => format!("{trimmed}()"),
        Some((name, params)) => {
            let mut call = String::from(name);
            call.push('(');
            for (i, param) in split_parameters(params).iter().enumerate() {
                if i > 0 {
                    call.push_str(", ");
                }
                call.push_str(&render_parameter(param));
            }
            call.push(')');
            call
        }
    }
}

/// Split on whitespace outside single/double quotes; a backslash escapes the
/// closing quote character inside a quoted run.
fn split_parameters(params: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut prev = '\0';

    for c in params.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q && prev != '\\' {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    current.push(c);
                } else if c == ' ' || c == '\t' {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(c);
                }
            }
        }
        prev = c;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn render_parameter(param: &str) -> String {
    if is_numeric(param)
        || matches!(param, "true" | "false" | "null" | "undefined")
        || param.starts_with('"')
        || param.starts_with('\'')
    {
        param.to_string()
    } else {
        format!("\"{}\"", escape_string(param))
    }
}

fn is_numeric(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    if digits.is_empty() {
        return false;
    }
    let mut seen_decimal = false;
    for c in digits.chars() {
        if c == '.' {
            if seen_decimal {
                return false;
            }
            seen_decimal = true;
        } else if !c.is_ascii_digit() {
            return false;
        }
    }
    true
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_becomes_nullary_call() {
        assert_eq!(build_call_expression("inc"), "inc()");
        assert_eq!(build_call_expression("  reset  "), "reset()");
    }

    #[test]
    fn whitespace_arguments_become_typed_parameters() {
        assert_eq!(build_call_expression("add 2 3.5"), "add(2, 3.5)");
        assert_eq!(
            build_call_expression("setName \"John Smith\""),
            "setName(\"John Smith\")"
        );
        assert_eq!(
            build_call_expression("setFlag true other null"),
            "setFlag(true, \"other\", null)"
        );
    }

    #[test]
    fn bare_identifiers_are_quoted() {
        assert_eq!(build_call_expression("greet world"), "greet(\"world\")");
    }

    #[test]
    fn existing_call_expressions_pass_through() {
        assert_eq!(build_call_expression("obj.fn(1, 'x')"), "obj.fn(1, 'x')");
        assert_eq!(build_call_expression("inc()"), "inc()");
    }

    #[test]
    fn quoted_arguments_keep_embedded_spaces() {
        assert_eq!(
            build_call_expression("say 'hello there' loud"),
            "say('hello there', \"loud\")"
        );
    }

    #[test]
    fn escaped_quote_does_not_close_the_run() {
        assert_eq!(
            build_call_expression(r#"say "a \" b""#),
            r#"say("a \" b")"#
        );
    }

    #[test]
    fn special_characters_are_escaped_when_quoting() {
        assert_eq!(
            build_call_expression("path C:\\temp"),
            "path(\"C:\\\\temp\")"
        );
    }

    #[test]
    fn negative_and_signed_numbers_stay_numeric() {
        assert_eq!(build_call_expression("move -3 +4.5"), "move(-3, +4.5)");
        // Two decimal points is not a number
        assert_eq!(build_call_expression("v 1.2.3"), "v(\"1.2.3\")");
    }

    #[test]
    fn blank_input_yields_empty() {
        assert_eq!(build_call_expression("   "), "");
    }
}
