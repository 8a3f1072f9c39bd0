//! Language definitions for the container runners
//!
//! Each supported language is declared in `files/languages.toml`, embedded at
//! compile time: the conventional source filename, the run command, an
//! optional compile command, and the image recipe. Adding a compile-and-run
//! language is a data change, not a code change.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;

/// Declarative definition of one supported language
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    /// Canonical language tag (e.g. "python")
    pub name: String,
    /// Conventional source filename (e.g. "solution.py")
    pub source_file: String,
    /// Command run inside the container
    pub run_command: Vec<String>,
    /// Compile command, if the language needs one
    pub compile_command: Option<Vec<String>>,
    /// Recipe filename under the recipe directory
    pub recipe: String,
}

impl LanguageSpec {
    /// Image tag used for this language's executor container
    pub fn image(&self) -> String {
        format!("{}-executor", self.name)
    }

    pub fn needs_compile(&self) -> bool {
        self.compile_command.is_some()
    }
}

/// Raw TOML shape for a language entry
#[derive(Debug, Deserialize)]
struct RawLanguageSpec {
    source_file: String,
    run_command: String,
    compile_command: Option<String>,
    recipe: String,
}

/// All languages shipped with the worker
pub fn builtin() -> anyhow::Result<Vec<LanguageSpec>> {
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    parse_languages(content)
}

fn parse_languages(content: &str) -> anyhow::Result<Vec<LanguageSpec>> {
    let raw: BTreeMap<String, RawLanguageSpec> =
        toml::from_str(content).context("failed to parse language definitions")?;

    let mut specs = Vec::with_capacity(raw.len());
    for (name, entry) in raw {
        let run_command = into_command(&entry.run_command);
        if run_command.is_empty() {
            anyhow::bail!("empty run command for language {}", name);
        }
        specs.push(LanguageSpec {
            name: name.to_lowercase(),
            source_file: entry.source_file,
            run_command,
            compile_command: entry.compile_command.as_deref().map(into_command),
            recipe: entry.recipe,
        });
    }
    Ok(specs)
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_includes_python_reference() {
        let specs = builtin().unwrap();
        let python = specs.iter().find(|s| s.name == "python").unwrap();

        assert_eq!(python.source_file, "solution.py");
        assert_eq!(python.run_command, vec!["python3", "solution.py"]);
        assert!(python.compile_command.is_none());
        assert_eq!(python.image(), "python-executor");
    }

    #[test]
    fn test_compiled_language_has_compile_command() {
        let specs = builtin().unwrap();
        let cpp = specs.iter().find(|s| s.name == "cpp").unwrap();

        assert!(cpp.needs_compile());
        assert_eq!(cpp.source_file, "solution.cpp");
    }

    #[test]
    fn test_parse_rejects_empty_run_command() {
        let content = r#"
[broken]
source_file = "x"
run_command = ""
recipe = "x.Dockerfile"
"#;
        assert!(parse_languages(content).is_err());
    }
}
