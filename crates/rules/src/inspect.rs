//! Entry-point discovery in generated rule source.
//!
//! The entry point is the first `pub struct <Name>` or `pub enum <Name>`
//! declared at the start of a line, optionally after attributes on the same
//! line (`#[derive(Default)] pub struct X;`). Comments are blanked out before
//! matching so commented-out declarations never count; indented declarations
//! (nested modules, impl blocks) are not top level and are skipped.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, RuleError};

fn declaration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(?:#\[[^\]\n]*\][ \t]*)*pub\s+(?:struct|enum)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .expect("valid entry-point regex")
    })
}

/// Name of the single public top-level type the source declares.
pub fn extract_entry_point(source: &str) -> Result<String> {
    let stripped = strip_comments(source);
    declaration_pattern()
        .captures(&stripped)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(RuleError::EntryPointNotFound)
}

/// Replace comment text with spaces, keeping newlines so line starts survive.
///
/// String and char literals are copied verbatim so `"//"` inside a literal
/// is not mistaken for a comment.
fn strip_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (c, next) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                let mut depth = 0usize;
                while i < chars.len() {
                    match (chars[i], chars.get(i + 1).copied()) {
                        ('/', Some('*')) => {
                            depth += 1;
                            out.push_str("  ");
                            i += 2;
                        }
                        ('*', Some('/')) => {
                            depth -= 1;
                            out.push_str("  ");
                            i += 2;
                            if depth == 0 {
                                break;
                            }
                        }
                        ('\n', _) => {
                            out.push('\n');
                            i += 1;
                        }
                        _ => {
                            out.push(' ');
                            i += 1;
                        }
                    }
                }
            }
            ('"', _) => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == '\\' {
                        if let Some(&escaped) = chars.get(i) {
                            out.push(escaped);
                            i += 1;
                        }
                    } else if ch == '"' {
                        break;
                    }
                }
            }
            // Char literal ('x' or '\n'); a bare quote is a lifetime.
            ('\'', Some('\\')) => {
                let close = chars[i + 2..]
                    .iter()
                    .position(|&ch| ch == '\'')
                    .map(|p| i + 2 + p + 1)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..close]);
                i = close;
            }
            ('\'', Some(_)) if chars.get(i + 2) == Some(&'\'') => {
                out.extend(&chars[i..i + 3]);
                i += 3;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_simple_declaration() {
        let src = "#[derive(Default)]\npub struct ColdWeatherRule;\n\nimpl NotificationRule for ColdWeatherRule {}\n";
        assert_eq!(extract_entry_point(src).unwrap(), "ColdWeatherRule");
    }

    #[test]
    fn first_declaration_wins() {
        let src = "pub struct First { x: i32 }\npub struct Second;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "First");
    }

    #[test]
    fn private_and_nested_types_are_ignored() {
        let src = "struct Helper;\nmod inner {\n    pub struct Nested;\n}\npub struct Visible;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "Visible");
    }

    #[test]
    fn commented_out_declarations_are_ignored() {
        let src = "// pub struct Old;\n/* pub struct AlsoOld;\n pub struct Nope; */\npub struct Current;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "Current");
    }

    #[test]
    fn nested_block_comments() {
        let src = "/* outer /* inner */\npub struct Hidden; */\npub struct Shown;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "Shown");
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let src = "const URL: &str = \"http://example.com\";\npub struct AfterString;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "AfterString");
    }

    #[test]
    fn missing_declaration_is_an_error() {
        let src = "fn main() { println!(\"hello\"); }\n";
        assert!(matches!(
            extract_entry_point(src),
            Err(RuleError::EntryPointNotFound)
        ));
        assert!(matches!(
            extract_entry_point(""),
            Err(RuleError::EntryPointNotFound)
        ));
    }

    #[test]
    fn quote_char_literal_does_not_open_a_string() {
        let src = r#"const Q: char = '"';
const S: char = '\\';
// pub struct Nope;
pub struct Real<'a>(&'a str);
"#;
        assert_eq!(extract_entry_point(src).unwrap(), "Real");
    }

    #[test]
    fn attributes_on_the_declaration_line_are_allowed() {
        let src = "#[derive(Default)] pub struct Inline;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "Inline");
        let src = "#[derive(Debug)] #[derive(Default)]\tpub struct Twice { n: u8 }\n";
        assert_eq!(extract_entry_point(src).unwrap(), "Twice");
        // Attribute then an indented declaration is still not top level.
        let src = "#[cfg(test)]\nmod t {\n    pub struct Nested;\n}\n";
        assert!(extract_entry_point(src).is_err());
    }

    #[test]
    fn public_enums_count_as_entry_points() {
        let src = "#[derive(Default)]\npub enum Mode {\n    #[default]\n    Quiet,\n}\npub struct Later;\n";
        assert_eq!(extract_entry_point(src).unwrap(), "Mode");
        assert!(extract_entry_point("enum Private { A }").is_err());
    }

    #[test]
    fn generic_and_tuple_structs_match() {
        assert_eq!(
            extract_entry_point("pub struct Threshold(f64);").unwrap(),
            "Threshold"
        );
        assert_eq!(
            extract_entry_point("pub struct   Spaced  {}").unwrap(),
            "Spaced"
        );
    }
}
