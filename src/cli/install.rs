use super::progress::{format_status, ProgressRenderer};
use crate::colors::*;
use crate::fetch::HttpFetch;
use crate::fs::OsFs;
use crate::installer::Installer;
use crate::options::InstallOptions;
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

pub(super) async fn run(options: InstallOptions, show_progress: bool) -> Result<()> {
    let started = Instant::now();
    let cwd = options.cwd.clone();
    let fetch = HttpFetch::new().map_err(|e| anyhow!(e))?;
    let mut installer = Installer::new(Arc::new(OsFs), Arc::new(fetch), options);

    let renderer = Arc::new(Mutex::new(ProgressRenderer::new()));
    if show_progress {
        let sink = renderer.clone();
        installer = installer.with_progress(move |phase, percent| {
            sink.lock().render(format_status(phase, percent));
        });
    }

    let result = installer.run().await;
    renderer.lock().clear_line();
    let report = result.with_context(|| format!("install in {}", cwd.display()))?;

    for warning in &report.warnings {
        println!("{C_YELLOW}warning{C_RESET} {warning}");
    }
    let elapsed = started.elapsed().as_secs_f64();
    if report.quick {
        println!("{C_GREEN}up to date{C_RESET} {C_DIM}(quick check, {elapsed:.2}s){C_RESET}");
        return Ok(());
    }
    match report.removed {
        Some(removed) if removed > 0 => println!(
            "{C_GREEN}installed{C_RESET} {C_DIM}removed {removed} stale package(s), {elapsed:.2}s{C_RESET}"
        ),
        _ => println!("{C_GREEN}installed{C_RESET} {C_DIM}{elapsed:.2}s{C_RESET}"),
    }
    Ok(())
}
