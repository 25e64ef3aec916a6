//! `hotswap classify`: compare two versions of a module component by component.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use oxc::allocator::Allocator;
use oxc::parser::Parser;
use serde::Serialize;

use crate::classify::{ChangeRecord, Classifier, source_type_for};
use crate::compiler::scan;
use crate::config::HotswapConfig;

/// Presence of a component across the two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Kept,
    Added,
    Removed,
}

/// One line of the report, keyed by export name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentChange {
    pub export: String,
    pub presence: Presence,
    /// Only for components present in both versions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeRecord>,
}

pub fn run(config: &HotswapConfig, old: &Path, new: &Path, pretty: bool) -> Result<()> {
    let changes = classify_files(config, old, new)?;
    let json = if pretty {
        serde_json::to_string_pretty(&changes)?
    } else {
        serde_json::to_string(&changes)?
    };
    println!("{json}");
    Ok(())
}

fn classify_files(config: &HotswapConfig, old: &Path, new: &Path) -> Result<Vec<ComponentChange>> {
    let old_defs = definitions(config, old)?;
    let new_defs = definitions(config, new)?;
    let classifier = Classifier::from_config(&config.classify);
    let source_type = source_type_for(&new.to_string_lossy());

    let mut changes = Vec::with_capacity(new_defs.len());
    for (export, new_text) in &new_defs {
        let previous = old_defs.iter().find(|(name, _)| name == export);
        let change = match previous {
            Some((_, old_text)) => Some(
                classifier
                    .classify_as(new_text, old_text, source_type)
                    .with_context(|| format!("cannot classify `{export}`"))?,
            ),
            None => None,
        };
        changes.push(ComponentChange {
            export: export.clone(),
            presence: if change.is_some() { Presence::Kept } else { Presence::Added },
            change,
        });
    }
    for (export, _) in &old_defs {
        if !new_defs.iter().any(|(name, _)| name == export) {
            changes.push(ComponentChange {
                export: export.clone(),
                presence: Presence::Removed,
                change: None,
            });
        }
    }
    Ok(changes)
}

/// `(export name, definition text)` for every component the module exports.
fn definitions(config: &HotswapConfig, path: &Path) -> Result<Vec<(String, String)>> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))?;

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &source, source_type_for(&path.to_string_lossy())).parse();
    if let Some(err) = ret.errors.first() {
        return Err(anyhow!("{}: {}", path.display(), err));
    }
    if ret.panicked {
        return Err(anyhow!("{}: parser aborted", path.display()));
    }

    Ok(scan::scan(&ret.program, &config.instrument.render_method)
        .into_iter()
        .map(|candidate| {
            let span = candidate.definition.span();
            let text = source[span.start as usize..span.end as usize].to_string();
            (candidate.export, text)
        })
        .collect())
}
