//! mdtasks watch: report external edits until interrupted

use std::sync::Arc;

use serde::Serialize;

use crate::cli::{Context, Target};
use crate::error::Result;
use crate::output::OutputOptions;
use crate::store::LoadReport;
use crate::watch::FileWatcher;

#[derive(Serialize)]
struct ReloadEvent<'a> {
    event: &'static str,
    file: String,
    report: &'a LoadReport,
}

pub(crate) fn run(target: Target, output: OutputOptions) -> Result<()> {
    let Context { store, config } = target.open()?;
    let store = Arc::new(store);
    let file = store.path().display().to_string();

    if !output.json && !output.quiet {
        println!("watching {file} (ctrl-c to stop)");
    }

    let reported = file.clone();
    let watcher = FileWatcher::start(Arc::clone(&store), config.debounce(), move |report| {
        print_reload(output, &reported, report);
    })?;
    watcher.wait();

    store.close()
}

fn print_reload(output: OutputOptions, file: &str, report: &LoadReport) {
    if output.json {
        let event = ReloadEvent {
            event: "reloaded",
            file: file.to_string(),
            report,
        };
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{line}");
        }
        return;
    }
    if output.quiet {
        return;
    }

    let mut line = format!(
        "reloaded {file}: {} task(s) in {} column(s)",
        report.tasks, report.columns
    );
    if report.normalized {
        line.push_str(", normalized");
    }
    println!("{line}");
    for diagnostic in &report.diagnostics {
        println!("  warning: {diagnostic}");
    }
}
