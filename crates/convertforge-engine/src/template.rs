//! Placeholder substitution for tool argument templates.

use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for argument templates.
///
/// Placeholders use the `{name}` syntax. Each argument is scanned once, so a
/// substituted value that itself contains braces is never expanded again, and
/// unknown placeholders are left untouched.
///
/// # Example
///
/// ```
/// use convertforge_engine::TemplateContext;
/// use std::path::Path;
///
/// let ctx = TemplateContext::new()
///     .with_paths(Path::new("/up/report.txt"), Path::new("/out/report.pdf"))
///     .with_var("target", "pdf");
///
/// assert_eq!(ctx.substitute("{input}"), "/up/report.txt");
/// assert_eq!(ctx.substitute("--outdir={outdir}"), "--outdir=/out");
/// assert_eq!(ctx.substitute("{filestem}.{target}"), "report.pdf");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set path-related variables.
    ///
    /// - `{input}` - Full path to the input file
    /// - `{output}` - Full path to the expected output file
    /// - `{outdir}` - Directory the output file lives in
    /// - `{filestem}` - Input file name without extension
    pub fn with_paths(mut self, input: &Path, output: &Path) -> Self {
        self.set("input", &input.display().to_string());
        self.set("output", &output.display().to_string());

        if let Some(parent) = output.parent() {
            self.set("outdir", &parent.display().to_string());
        }
        if let Some(stem) = input.file_stem() {
            self.set("filestem", &stem.to_string_lossy());
        }

        self
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Set a variable.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a single template.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.vars.get(name) {
                        Some(value) => result.push_str(value),
                        None => {
                            result.push('{');
                            result.push_str(name);
                            result.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    result.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }

    /// Substitute variables in a list of templates.
    pub fn substitute_all<S: AsRef<str>>(&self, templates: &[S]) -> Vec<String> {
        templates
            .iter()
            .map(|t| self.substitute(t.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_substitute_paths() {
        let ctx = TemplateContext::new().with_paths(
            &PathBuf::from("/uploads/abc-report.docx"),
            &PathBuf::from("/output/abc-report.pdf"),
        );

        assert_eq!(ctx.substitute("{input}"), "/uploads/abc-report.docx");
        assert_eq!(ctx.substitute("{output}"), "/output/abc-report.pdf");
        assert_eq!(ctx.substitute("{outdir}"), "/output");
        assert_eq!(ctx.substitute("{filestem}"), "abc-report");
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let ctx = TemplateContext::new().with_var("a", "1");
        assert_eq!(ctx.substitute("{a}-{b}"), "1-{b}");
    }

    #[test]
    fn test_unclosed_brace_kept() {
        let ctx = TemplateContext::new().with_var("a", "1");
        assert_eq!(ctx.substitute("x{a"), "x{a");
    }

    #[test]
    fn test_values_not_expanded_twice() {
        let ctx = TemplateContext::new()
            .with_var("input", "/tmp/{output}.txt")
            .with_var("output", "SHOULD-NOT-APPEAR");
        assert_eq!(ctx.substitute("{input}"), "/tmp/{output}.txt");
    }

    #[test]
    fn test_substitute_all() {
        let ctx = TemplateContext::new().with_var("name", "test");
        let results = ctx.substitute_all(&["{name}.txt", "-o", "{name}.log"]);
        assert_eq!(results, vec!["test.txt", "-o", "test.log"]);
    }
}
