use std::fmt::Write as _;

use chrono::SecondsFormat;
use miniprof_core::model::record::{EnrichedResult, ResultSet};
use miniprof_core::model::span::Span;
use miniprof_core::model::stats::Appstats;
use owo_colors::OwoColorize;

const SLOW_STEP_MS: f64 = 100.0;

pub fn print_results_human(set: &ResultSet, color: bool) {
    print!("{}", render_results(set, color));
}

pub fn render_results(set: &ResultSet, color: bool) -> String {
    let mut out = String::new();
    if !set.ok {
        out.push_str("no request ids given\n");
        return out;
    }
    for result in set.results() {
        render_result(&mut out, result, color);
    }
    let _ = writeln!(out, "-- {} results --", set.results().len());
    out
}

fn render_result(out: &mut String, result: &EnrichedResult, color: bool) {
    let header = format!("REQUEST {} {}", result.id, result.request_url);
    let header = if color {
        header.bold().to_string()
    } else {
        header
    };
    let _ = writeln!(
        out,
        "{header} at={}{}",
        result
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        if result.redirect { " redirect" } else { "" }
    );

    result.profile.walk(&mut |span: &Span, _parent: Option<&Span>| {
        let _ = writeln!(out, "{}{}", "  ".repeat(span.depth + 1), span_line(span, color));
    });

    if let Some(appstats) = &result.appstats {
        render_appstats(out, appstats);
    }
}

fn span_line(span: &Span, color: bool) -> String {
    match span.duration_ms() {
        Some(ms) => {
            let timing = format!("({ms:.2} ms)");
            let timing = if color && ms >= SLOW_STEP_MS {
                timing.yellow().to_string()
            } else {
                timing
            };
            format!("{} {timing}", span.name)
        }
        None => format!("{} (open)", span.name),
    }
}

fn render_appstats(out: &mut String, appstats: &Appstats) {
    let _ = writeln!(out, "  rpc total={}ms", appstats.total_time);
    if let Some(totals) = &appstats.rpc_stats {
        for (name, t) in totals {
            let _ = writeln!(
                out,
                "    {name} calls={} time={}ms",
                t.total_calls, t.total_time
            );
        }
    }
    if let Some(calls) = &appstats.rpc_calls {
        for call in calls {
            let _ = writeln!(
                out,
                "    +{}ms {} {}ms",
                call.start_offset, call.service_call_name, call.total_time
            );
            for frame in &call.call_stack {
                let _ = writeln!(out, "        at {frame}");
            }
        }
    }
}
