use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tempfile::NamedTempFile;

use crate::error::{ProvisionError, Result};
use crate::models::{SectionInsert, TemplateSpec};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").unwrap());

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]\s*$").unwrap());

/// Upper bound on replace passes, so a value that expands to itself terminates.
const MAX_PASSES: usize = 8;

/// Names of all `%NAME%` placeholders in `template`.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Expand every known placeholder in `template`.
///
/// Values may themselves contain placeholders; passes repeat until nothing
/// known is left. Any marker still present afterwards is an error, `context`
/// names the template in that error.
pub fn render_str(
    template: &str,
    substitutions: &BTreeMap<String, String>,
    context: &str,
) -> Result<String> {
    let mut rendered = template.to_string();
    for _ in 0..MAX_PASSES {
        let mut changed = false;
        let next = PLACEHOLDER_RE.replace_all(&rendered, |caps: &Captures| {
            match substitutions.get(&caps[1]) {
                Some(value) => {
                    changed = true;
                    value.clone()
                }
                None => caps[0].to_string(),
            }
        });
        let next = next.into_owned();
        rendered = next;
        if !changed {
            break;
        }
    }

    if let Some(caps) = PLACEHOLDER_RE.captures(&rendered) {
        return Err(ProvisionError::UnresolvedPlaceholder {
            placeholder: caps[1].to_string(),
            context: context.to_string(),
        });
    }
    Ok(rendered)
}

/// Append `lines` at the end of the `[section]` block of an INI-style file.
///
/// A missing section is created at the end of the file. Lines already present
/// in the section are skipped so repeated runs do not duplicate them.
pub fn insert_under_section(content: &str, section: &str, lines: &[String]) -> String {
    let mut out: Vec<String> = content.lines().map(str::to_string).collect();

    let header = out.iter().position(|line| {
        SECTION_RE
            .captures(line)
            .is_some_and(|caps| caps[1].trim() == section)
    });

    match header {
        Some(start) => {
            let end = out[start + 1..]
                .iter()
                .position(|line| SECTION_RE.is_match(line))
                .map(|offset| start + 1 + offset)
                .unwrap_or(out.len());

            let existing: BTreeSet<&str> =
                out[start + 1..end].iter().map(|l| l.trim()).collect();
            let mut fresh: Vec<String> = Vec::new();
            for line in lines {
                if !existing.contains(line.trim()) && !fresh.contains(line) {
                    fresh.push(line.clone());
                }
            }

            // Insert before trailing blank lines so sections stay separated.
            let mut insert_at = end;
            while insert_at > start + 1 && out[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            out.splice(insert_at..insert_at, fresh);
        }
        None => {
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            out.push(format!("[{section}]"));
            out.extend(lines.iter().cloned());
        }
    }

    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

/// Read and render one template file.
pub async fn render_file(path: &Path, substitutions: &BTreeMap<String, String>) -> Result<String> {
    let template = tokio::fs::read_to_string(path).await.map_err(|e| {
        ProvisionError::Io(std::io::Error::new(
            e.kind(),
            format!("reading template {}: {e}", path.display()),
        ))
    })?;
    render_str(&template, substitutions, &path.display().to_string())
}

/// Render a template plus its section inserts into the final file content.
pub async fn render_spec(
    spec: &TemplateSpec,
    template_root: &Path,
    substitutions: &BTreeMap<String, String>,
) -> Result<String> {
    let source = resolve_against(template_root, &spec.source);
    let mut content = render_file(&source, substitutions).await?;
    for SectionInsert { section, lines } in &spec.sections {
        let context = format!("{} [{section}]", source.display());
        let rendered: Vec<String> = lines
            .iter()
            .map(|line| render_str(line, substitutions, &context))
            .collect::<Result<_>>()?;
        content = insert_under_section(&content, section, &rendered);
    }
    Ok(content)
}

/// Render every template of a service and replace its config directory.
///
/// All templates are rendered before anything is touched on disk: a single
/// unresolved placeholder leaves the previous configuration as it was.
pub async fn materialize(
    templates: &[TemplateSpec],
    template_root: &Path,
    config_dir: &Path,
    substitutions: &BTreeMap<String, String>,
) -> Result<Vec<PathBuf>> {
    let mut rendered = Vec::with_capacity(templates.len());
    for spec in templates {
        let content = render_spec(spec, template_root, substitutions).await?;
        rendered.push((resolve_against(config_dir, &spec.destination), content));
    }

    if config_dir.exists() {
        tokio::fs::remove_dir_all(config_dir).await?;
    }
    tokio::fs::create_dir_all(config_dir).await?;

    let mut written = Vec::with_capacity(rendered.len());
    for (destination, content) in rendered {
        atomic_write(&destination, content.as_bytes())?;
        tracing::debug!(path = %destination.display(), "rendered config");
        written.push(destination);
    }
    Ok(written)
}

/// Write `data` to `path` through a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
