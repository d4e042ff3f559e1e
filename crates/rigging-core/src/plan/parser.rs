//! Plan TOML parsing with line context in error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::schema::PlanFile;

pub fn parse_plan_toml(path: &Path) -> Result<PlanFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

    parse_plan_str(&content)
        .with_context(|| format!("Failed to parse plan file: {}", path.display()))
}

pub fn parse_plan_str(content: &str) -> Result<PlanFile> {
    toml::from_str(content).map_err(|e| enhance_toml_error(e, content))
}

fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    match error.span() {
        Some(span) => {
            let offset = span.start.min(content.len());
            let line_num = content[..offset].matches('\n').count() + 1;
            anyhow::anyhow!(
                "TOML error at line {}:\n{}\n\nError: {}",
                line_num,
                line_context(content, line_num),
                message
            )
        }
        None => anyhow::anyhow!("TOML error: {}", message),
    }
}

fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let plan = parse_plan_str(
            r#"
[[component]]
group = "Core"
name = "Identity"

[[wire]]
source = "Core#Identity"
setter = "setSelfAddress"
target = "Core#Identity"

[[grant]]
source = "Core#Identity"
role = "admin"
grantee = "Core#Identity"
"#,
        )
        .unwrap();
        assert_eq!(plan.components.len(), 1);
        assert_eq!(plan.wires[0].setter.as_deref(), Some("setSelfAddress"));
        assert_eq!(plan.grants[0].role, "admin");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_plan_str("[[component]]\ngroup = \"Core\"\nname = \"A\"\ncolour = 1\n")
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("colour"), "{message}");
    }

    #[test]
    fn empty_plan_is_valid() {
        let plan = parse_plan_str("").unwrap();
        assert!(plan.components.is_empty());
    }
}
