use std::path::Path;

use console::Style;
use redux_core::ledger::Record;
use redux_core::pipeline::{FrameReport, FrameStatus, RecipeGraph, ReduxConfig, RunSummary};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    failed: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            failed: Style::new().red().bold(),
        }
    }

    fn status(&self, status: &FrameStatus) -> &Style {
        match status {
            FrameStatus::Completed => &self.method,
            FrameStatus::Failed { .. } | FrameStatus::Unclassified(_) => &self.failed,
            _ => &self.disabled,
        }
    }
}

const RULE: &str = "\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}";

pub fn print_run_header(config: &ReduxConfig, manifest: &Path, frames: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Redux Pipeline"));
    println!("  {}", s.title.apply_to(RULE));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Manifest"),
        s.path.apply_to(manifest.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Ledger"),
        s.path.apply_to(config.ledger.path.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(frames)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Clobber"),
        if config.instrument.clobber {
            s.method.apply_to("yes")
        } else {
            s.disabled.apply_to("no")
        }
    );
    println!();

    println!("  {}", s.header.apply_to("Stack thresholds"));
    let thresholds = [
        ("Bias", config.instrument.bias_min_nframes),
        ("Dark", config.instrument.dark_min_nframes),
        ("Cont. bars", config.instrument.contbars_min_nframes),
        ("Flat", config.instrument.flat_min_nframes),
        ("Dome flat", config.instrument.dome_min_nframes),
        ("Twilight", config.instrument.twiflat_min_nframes),
        ("Arc", config.instrument.arc_min_nframes),
    ];
    for (label, n) in thresholds {
        println!("    {:<12}{}", s.label.apply_to(label), s.value.apply_to(n));
    }
    println!();

    println!("  {}", s.header.apply_to("Objects"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Product"),
        s.method.apply_to(config.object.new_type)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Cube slices"),
        s.value.apply_to(config.parallel.cube_slices)
    );
    println!();
}

pub fn print_run_summary(reports: &[FrameReport], totals: &RunSummary, pending: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Frames"));
    for report in reports {
        println!(
            "    {:<24}{}",
            s.label.apply_to(&report.frame),
            s.status(&report.status).apply_to(&report.status)
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Totals"));
    let rows = [
        ("Completed", totals.completed),
        ("Already done", totals.already_processed),
        ("Duplicates", totals.duplicates),
        ("Deferred", totals.deferred),
        ("Rejected", totals.rejected),
        ("Unrouted", totals.unrouted),
        ("Unclassified", totals.unclassified),
        ("Failed", totals.failed),
    ];
    for (label, n) in rows.into_iter().filter(|(_, n)| *n > 0) {
        println!("    {:<14}{}", s.label.apply_to(label), s.value.apply_to(n));
    }
    if pending > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Ledger"),
            s.failed.apply_to(format!("{pending} row(s) not yet written"))
        );
    }
    println!();
}

pub fn print_graph(graph: &RecipeGraph, longest: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Recipe Graph"));
    println!("  {}", s.title.apply_to(RULE));
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Events"),
        s.value.apply_to(graph.len())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Longest"),
        s.value.apply_to(format!("{longest} hops"))
    );
    println!();

    for entry in graph.entry_events() {
        if let Ok(path) = graph.path_from(entry) {
            print_chain(graph, &path);
        }
    }
}

pub fn print_chain(graph: &RecipeGraph, path: &[String]) {
    let s = Styles::new();

    let Some(first) = path.first() else {
        return;
    };
    println!("  {}", s.header.apply_to(first));
    for event in path {
        let Some(step) = graph.step(event) else {
            continue;
        };
        let mut tags = Vec::new();
        if step.stack {
            tags.push("stack");
        }
        if !step.record {
            tags.push("control");
        }
        println!(
            "    {:<28}{:<24}{}",
            s.value.apply_to(event),
            s.method.apply_to(&step.stage),
            s.disabled.apply_to(tags.join(", "))
        );
    }
    println!();
}

pub fn print_records(records: &[Record]) {
    let s = Styles::new();

    if records.is_empty() {
        println!("  {}", s.disabled.apply_to("no rows"));
        return;
    }
    for r in records {
        let mjd = r.mjd.map(|m| format!("{m:.5}")).unwrap_or_default();
        println!(
            "  {:>5}  {:<24}{:<10}{:<14}{:<26}{:<10}{}",
            s.label.apply_to(r.seq),
            s.path.apply_to(&r.frame),
            s.method.apply_to(r.frame_type),
            s.value.apply_to(&r.group),
            r.stage,
            r.suffix,
            s.label.apply_to(mjd)
        );
    }
}
