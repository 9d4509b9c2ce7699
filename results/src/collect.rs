//! `pytest --collect-only` listing parser.
//!
//! Collection prints the node tree one node per line, indented by depth:
//!
//! ```text
//! <Module 'tests/test_a.py'>
//!   <UnitTestCase 'TestX'>
//!     <TestCaseFunction 'test_one'>
//! <Module tests/test_b.py>
//!   <Function test_two>
//! ```
//!
//! A class covers the lines indented deeper than its own node line.
//! Older pytest releases quote node names, newer ones do not; both are
//! accepted. Lines that do not start with `<` (headers, summaries) are ignored.

use serde::{Deserialize, Serialize};

/// A collected test item and the containers it was listed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedTest {
    /// Module the test belongs to.
    pub module: Option<String>,

    /// Class the test belongs to, if any.
    pub class: Option<String>,

    /// Test item name.
    pub function: String,
}

/// Node kinds that only structure the tree and never hold tests directly.
const STRUCTURAL_KINDS: &[&str] = &["Package", "Dir", "Directory", "Session", "Instance"];

/// Parses collection output into test items in listing order.
///
/// # Example
///
/// ```
/// use wipwatch_results::parse_collect_output;
///
/// let tests = parse_collect_output("<Module 'tests/test_a.py'>\n  <Function 'test_one'>\n");
/// assert_eq!(tests[0].module.as_deref(), Some("tests/test_a.py"));
/// assert_eq!(tests[0].function, "test_one");
/// ```
#[must_use]
pub fn parse_collect_output(stdout: &str) -> Vec<CollectedTest> {
    let mut tests = Vec::new();
    let mut current_module: Option<String> = None;
    // Class name and the indent of its node line.
    let mut current_class: Option<(String, usize)> = None;

    for line in stdout.lines() {
        let trimmed = line.trim_start();
        let Some((kind, name)) = parse_node(trimmed.trim_end()) else {
            continue;
        };

        let indent = line.len() - trimmed.len();
        if current_class
            .as_ref()
            .is_some_and(|(_, class_indent)| indent <= *class_indent)
        {
            current_class = None;
        }

        match kind {
            "Module" => {
                current_module = Some(name.to_string());
                current_class = None;
            }
            "UnitTestCase" | "Class" => current_class = Some((name.to_string(), indent)),
            kind if STRUCTURAL_KINDS.contains(&kind) => {}
            _ => tests.push(CollectedTest {
                module: current_module.clone(),
                class: current_class.as_ref().map(|(class, _)| class.clone()),
                function: name.to_string(),
            }),
        }
    }

    tests
}

/// Splits `<Kind 'name'>` or `<Kind name>` into its kind and name.
fn parse_node(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix('<')?;
    let (kind, rest) = inner.split_once(' ')?;

    let name = match rest.split_once('\'') {
        Some((_, quoted)) => quoted.split_once('\'').map_or(quoted, |(name, _)| name),
        None => rest.strip_suffix('>').unwrap_or(rest),
    };

    Some((kind, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(module: &str, class: Option<&str>, function: &str) -> CollectedTest {
        CollectedTest {
            module: Some(module.to_string()),
            class: class.map(str::to_string),
            function: function.to_string(),
        }
    }

    #[test]
    fn parses_quoted_listing() {
        let output = "\
============================= test session starts ==============================
collected 3 items
<Module 'tests/test_a.py'>
  <UnitTestCase 'TestX'>
    <TestCaseFunction 'test_one'>
    <TestCaseFunction 'test_two'>
<Module 'tests/test_b.py'>
  <Function 'test_three'>

========================= no tests ran in 0.01 seconds =========================
";
        assert_eq!(
            parse_collect_output(output),
            vec![
                item("tests/test_a.py", Some("TestX"), "test_one"),
                item("tests/test_a.py", Some("TestX"), "test_two"),
                item("tests/test_b.py", None, "test_three"),
            ]
        );
    }

    #[test]
    fn parses_unquoted_listing_with_directories() {
        let output = "\
<Dir project>
  <Package tests>
    <Module test_c.py>
      <Class TestY>
        <Function test_four>
      <Function test_param[1-2]>
";
        assert_eq!(
            parse_collect_output(output),
            vec![
                item("test_c.py", Some("TestY"), "test_four"),
                item("test_c.py", None, "test_param[1-2]"),
            ]
        );
    }

    #[test]
    fn function_after_class_is_module_level() {
        let output = "<Module test_c.py>\n  <Class TestY>\n    <Function test_four>\n  <Function test_five>\n";
        let tests = parse_collect_output(output);
        assert_eq!(tests[0], item("test_c.py", Some("TestY"), "test_four"));
        assert_eq!(tests[1], item("test_c.py", None, "test_five"));
    }

    #[test]
    fn sibling_classes_replace_each_other() {
        let output = "\
<Module 'tests/test_d.py'>
  <Class 'TestA'>
    <Function 'test_a'>
  <Class 'TestB'>
    <Function 'test_b'>
";
        let tests = parse_collect_output(output);
        assert_eq!(tests[0], item("tests/test_d.py", Some("TestA"), "test_a"));
        assert_eq!(tests[1], item("tests/test_d.py", Some("TestB"), "test_b"));
    }

    #[test]
    fn new_module_resets_class() {
        let output = "<Module 'a.py'>\n<Class 'T'>\n<Function 'f'>\n<Module 'b.py'>\n<Function 'g'>\n";
        let tests = parse_collect_output(output);
        assert_eq!(tests[1], item("b.py", None, "g"));
    }

    #[test]
    fn item_before_module_has_no_module() {
        let tests = parse_collect_output("<Function 'orphan'>");
        assert_eq!(tests[0].module, None);
        assert_eq!(tests[0].function, "orphan");
    }

    #[test]
    fn ignores_non_node_lines() {
        assert!(parse_collect_output("collected 0 items\n<malformed\n\n").is_empty());
    }

    #[test]
    fn parse_node_variants() {
        assert_eq!(parse_node("<Module 'a.py'>"), Some(("Module", "a.py")));
        assert_eq!(parse_node("<Module a.py>"), Some(("Module", "a.py")));
        assert_eq!(parse_node("Module a.py"), None);
        assert_eq!(parse_node("<Session>"), None);
    }
}
