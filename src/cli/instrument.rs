//! `hotswap instrument`: run the instrumentor over one file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::compiler::Compiler;
use crate::config::HotswapConfig;
use crate::log;

pub fn run(config: &HotswapConfig, file: &Path, output: Option<&Path>, list: bool) -> Result<()> {
    let source =
        fs::read_to_string(file).with_context(|| format!("failed to read `{}`", file.display()))?;
    let path = absolute(file)?;

    let mut compiler = Compiler::new(config);
    let module_path = compiler.module_path(&path);
    let instrumented = compiler
        .compile_source(&source, &module_path)
        .with_context(|| format!("cannot instrument `{}`", file.display()))?;

    if !instrumented.is_instrumented() {
        log!("compile"; "no components found in {}", module_path);
    }

    let text = if list {
        serde_json::to_string_pretty(&instrumented.components)? + "\n"
    } else {
        instrumented.code
    };

    match output {
        Some(output) => {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(output, text)
                .with_context(|| format!("failed to write `{}`", output.display()))?;
            log!("compile"; "{} -> {}", module_path, output.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_instrument_to_file() {
        let dir = TempDir::new().unwrap();
        let config = HotswapConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let file = dir.path().join("src/App.jsx");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "export default function App() { return <div />; }\n").unwrap();

        let out = dir.path().join("out/App.js");
        run(&config, &file, Some(&out), false).unwrap();
        let code = fs::read_to_string(&out).unwrap();
        assert!(code.contains("bindId(App"));

        let listing = dir.path().join("out/App.json");
        run(&config, &file, Some(&listing), true).unwrap();
        let components: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&listing).unwrap()).unwrap();
        assert_eq!(components[0]["export"], "default");
        assert_eq!(components[0]["kind"], "function");
    }

    #[test]
    fn test_instrument_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Broken.jsx");
        fs::write(&file, "function Broken( {").unwrap();
        let config = HotswapConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(run(&config, &file, Some(&dir.path().join("x.js")), false).is_err());
    }
}
