use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SecondsFormat};
use owo_colors::OwoColorize;
use zipflux_core::constants::ERROR;
use zipflux_core::model::dependency::{DependencyBucket, DependencyLink};
use zipflux_core::model::span::Span;
use zipflux_core::model::v1::{BinaryValue, V1Span};

pub fn print_traces_human(traces: &[Vec<Span>]) {
    for trace in traces {
        let Some(first) = trace.first() else {
            continue;
        };
        let root = trace
            .iter()
            .find(|s| s.parent_id.is_none())
            .unwrap_or(first);
        println!(
            "trace={} spans={} duration={} root=\"{}\" service={}",
            first.trace_id,
            trace.len(),
            format_micros(root.duration),
            root.name,
            root.service_name().unwrap_or("-").cyan()
        );
    }
    println!("-- {} traces --", traces.len());
}

pub fn print_trace_human(spans: &[Span]) {
    let Some(first) = spans.first() else {
        println!("-- trace not found --");
        return;
    };
    let errors = spans.iter().filter(|s| s.tags.contains_key(ERROR)).count();
    println!(
        "TRACE {} spans={} errors={}",
        first.trace_id,
        spans.len(),
        errors
    );
    print_span_tree(spans);
}

pub fn print_names_human(names: &[String], what: &str) {
    for name in names {
        println!("{name}");
    }
    println!("-- {} {what} --", names.len());
}

pub fn print_dependencies_human(links: &[DependencyLink]) {
    for link in links {
        let errors = if link.error_count > 0 {
            format!(" errors={}", link.error_count).red().to_string()
        } else {
            String::new()
        };
        println!(
            "{} -> {} calls={}{}",
            link.parent.cyan(),
            link.child.cyan(),
            link.call_count,
            errors
        );
    }
    println!("-- {} links --", links.len());
}

pub fn print_buckets_human(buckets: &[DependencyBucket]) {
    for b in buckets {
        println!(
            "day={} id={} parent={} count={}",
            format_timestamp(b.bucket),
            b.id,
            b.parent_id.as_deref().unwrap_or("-"),
            b.count
        );
    }
    println!("-- {} buckets --", buckets.len());
}

pub fn print_v1_spans_human(spans: &[V1Span]) {
    for span in spans {
        println!(
            "span={} trace={} parent={} name=\"{}\" timestamp={} duration={}",
            span.id,
            span.trace_id,
            span.parent_id.as_deref().unwrap_or("-"),
            span.name,
            span.timestamp
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            format_micros(span.duration)
        );
        for a in &span.annotations {
            println!("  @{} {}", a.timestamp, a.value.yellow());
        }
        for b in &span.binary_annotations {
            let value = match &b.value {
                BinaryValue::String(s) => s.clone(),
                BinaryValue::Address(_) => b
                    .endpoint
                    .as_ref()
                    .map(|e| e.service_name.clone())
                    .unwrap_or_default(),
            };
            println!("  {}={}", b.key, value);
        }
    }
    println!("-- {} spans --", spans.len());
}

fn format_micros(duration: Option<i64>) -> String {
    match duration {
        Some(us) => format!("{:.3}ms", us as f64 / 1000.0),
        None => "-".to_string(),
    }
}

fn format_timestamp(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| micros.to_string())
}

fn print_span_tree(spans: &[Span]) {
    let known: HashSet<&str> = spans.iter().map(|s| s.id.as_str()).collect();
    let mut children: HashMap<Option<&str>, Vec<&Span>> = HashMap::new();
    for span in spans {
        // Orphans hang off the top level so nothing is hidden.
        let parent = span.parent_id.as_deref().filter(|p| known.contains(p));
        children.entry(parent).or_default().push(span);
    }
    for kids in children.values_mut() {
        kids.sort_by_key(|s| s.timestamp);
    }
    if let Some(roots) = children.get(&None) {
        for root in roots {
            print_node(root, &children, 0);
        }
    }
}

fn print_node(span: &Span, children: &HashMap<Option<&str>, Vec<&Span>>, depth: usize) {
    let indent = "  ".repeat(depth);
    let status = if span.tags.contains_key(ERROR) {
        "ERROR".red().to_string()
    } else {
        String::new()
    };
    println!(
        "{}{} {} ({}) {}",
        indent,
        span.service_name().unwrap_or("-").cyan(),
        span.name,
        format_micros(span.duration),
        status
    );

    if let Some(kids) = children.get(&Some(span.id.as_str())) {
        for child in kids {
            print_node(child, children, depth + 1);
        }
    }
}
