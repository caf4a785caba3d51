//! Recipe Synthesizer (§4.6): emits the ordered build-recipe directives and
//! replays the update image's post-prefix metadata-only history entries.

use crate::manifest::HistoryEntry;
use crate::tree::Delta;
use anyhow::{Context, Result};

const NOP_SENTINEL: &str = "#(nop)";

fn history_common_prefix(base: &[HistoryEntry], update: &[HistoryEntry]) -> usize {
    base.iter()
        .zip(update.iter())
        .take_while(|(b, u)| b.created_by == u.created_by)
        .count()
}

/// Strips the `#(nop)` sentinel and leading/trailing whitespace, returning the bare
/// directive text (e.g. `CMD ["python" "app.py"]`), or `None` if the entry isn't a
/// `#(nop)` metadata directive.
fn extract_directive(created_by: &str) -> Option<String> {
    let idx = created_by.find(NOP_SENTINEL)?;
    let after = &created_by[idx + NOP_SENTINEL.len()..];
    let trimmed = after.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Re-emits `CMD`/`ENTRYPOINT` array-form directives in canonical syntax
/// (`CMD ["a","b"]`, no intervening spaces); other directives pass through verbatim.
fn normalize_directive(directive: &str) -> Result<String> {
    let (name, rest) = match directive.split_once(char::is_whitespace) {
        Some((n, r)) => (n, r.trim()),
        None => (directive, ""),
    };

    if (name == "CMD" || name == "ENTRYPOINT") && rest.starts_with('[') && rest.ends_with(']') {
        let inner = &rest[1..rest.len() - 1];
        let tokens = shell_words::split(inner)
            .with_context(|| format!("failed to tokenize directive body: {}", inner))?;
        let quoted: Vec<String> = tokens.iter().map(|t| format!("\"{}\"", t)).collect();
        Ok(format!("{} [{}]", name, quoted.join(",")))
    } else {
        Ok(directive.to_string())
    }
}

/// Builds the ordered recipe lines: `FROM`, optional deletion directives, optional
/// `ADD files.tar /`, then the replayed history tail.
pub fn synthesize_recipe(
    base_ref: &str,
    delta: &Delta,
    additions_tarball_exists: bool,
    base_history: &[HistoryEntry],
    update_history: &[HistoryEntry],
) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    lines.push(format!("FROM {}", base_ref));

    if !delta.removed_files.is_empty() {
        lines.push(format!("RUN rm {}", shell_words::join(&delta.removed_files)));
    }
    if !delta.removed_dirs.is_empty() {
        lines.push(format!("RUN rm -rf {}", shell_words::join(&delta.removed_dirs)));
    }
    if additions_tarball_exists {
        lines.push("ADD files.tar /".to_string());
    }

    let h = history_common_prefix(base_history, update_history);
    for entry in &update_history[h..] {
        if !entry.empty_layer {
            continue;
        }
        if let Some(directive) = extract_directive(&entry.created_by) {
            lines.push(normalize_directive(&directive)?);
        }
    }

    Ok(lines)
}
