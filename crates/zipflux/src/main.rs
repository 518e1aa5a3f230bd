mod api_server;
mod output;
mod telemetry;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use zipflux_core::config::Config;
use zipflux_core::ids::lookup_trace_id;
use zipflux_core::model::simple::SimpleSpan;
use zipflux_core::normalize::to_v1_spans;
use zipflux_core::query::QueryRequest;
use zipflux_core::time::{parse_end_millis, parse_lookback_millis, parse_micros};
use zipflux_store::SpanStore;
use zipflux_store::query::{
    dependencies_query, dependency_spans_query, service_names_query, span_names_query,
    trace_by_id_query, trace_filter_query,
};

use crate::output::{
    print_buckets_human, print_dependencies_human, print_names_human, print_trace_human,
    print_traces_human, print_v1_spans_human,
};
use crate::telemetry::{init_cli_tracing, init_serve_tracing};

#[derive(Parser, Debug)]
#[command(name = "zipflux")]
#[command(about = "Query Zipkin spans stored in InfluxDB")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "InfluxDB base url (overrides config)")]
    url: Option<String>,

    #[arg(long, global = true, help = "InfluxDB database (overrides config)")]
    database: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Search traces of a service")]
    Traces {
        #[command(flatten)]
        args: TracesArgs,
        #[arg(long, help = "Print the InfluxQL instead of running it")]
        dry_run: bool,
    },
    #[command(about = "Fetch every span of one trace")]
    Trace {
        trace_id: String,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "List service names")]
    Services {
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "List span names of a service")]
    Spans {
        service: String,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Service call graph over a time window")]
    Dependencies {
        #[arg(long, default_value = "now")]
        end: String,
        #[arg(long, default_value = "24h")]
        lookback: String,
        #[arg(long, help = "Raw per-day counts by span and parent id")]
        counts: bool,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Convert simplified spans (JSON file, '-' for stdin) to v1 spans")]
    Normalize { file: PathBuf },
    #[command(about = "Serve the read-only Zipkin v2 API")]
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
struct TracesArgs {
    #[arg(long)]
    service: String,
    #[arg(long)]
    span: Option<String>,
    #[arg(long, help = "Tag filter, e.g. \"error and http.method=GET\"")]
    annotation: Option<String>,
    #[arg(long, help = "Minimum duration (e.g. 150ms, bare numbers are microseconds)")]
    min_duration: Option<String>,
    #[arg(long)]
    max_duration: Option<String>,
    #[arg(long, default_value = "now", help = "RFC3339 time or a duration ago")]
    end: String,
    #[arg(long, default_value = "24h")]
    lookback: String,
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

impl TracesArgs {
    fn to_request(&self) -> anyhow::Result<QueryRequest> {
        let annotation_query = match &self.annotation {
            Some(raw) => QueryRequest::parse_annotation_query(raw)?,
            None => Default::default(),
        };
        let req = QueryRequest {
            service_name: self.service.clone(),
            span_name: self.span.clone(),
            end_ts: parse_end_millis(&self.end)?,
            lookback: parse_lookback_millis(&self.lookback)?,
            min_duration: self.min_duration.as_deref().map(parse_micros).transpose()?,
            max_duration: self.max_duration.as_deref().map(parse_micros).transpose()?,
            annotation_query,
            limit: self.limit,
        };
        req.validate()?;
        Ok(req)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if matches!(cli.command, Commands::Serve { .. }) {
        init_serve_tracing();
    } else {
        init_cli_tracing();
    }

    let mut cfg = Config::load().context("load config")?;
    if let Some(url) = cli.url {
        cfg.url = url.trim_end_matches('/').to_string();
    }
    if let Some(database) = cli.database {
        cfg.database = database;
    }
    let json = cli.json;

    match cli.command {
        Commands::Traces { args, dry_run } => {
            let req = args.to_request()?;
            if dry_run {
                return print_statement(&trace_filter_query(&cfg.measurement, &req), json);
            }
            let store = SpanStore::from_config(&cfg);
            let traces = store.get_traces(&req).await.context("query traces")?;
            store.close().await?;
            print_or_json(&traces, json, || print_traces_human(&traces))
        }
        Commands::Trace { trace_id, dry_run } => {
            if dry_run {
                let id = lookup_trace_id(&trace_id, cfg.strict_trace_id)?;
                return print_statement(&trace_by_id_query(&cfg.measurement, &id), json);
            }
            let store = SpanStore::from_config(&cfg);
            let spans = store
                .get_trace(&trace_id)
                .await
                .with_context(|| format!("query trace {trace_id}"))?;
            store.close().await?;
            print_or_json(&spans, json, || print_trace_human(&spans))
        }
        Commands::Services { dry_run } => {
            if dry_run {
                return print_statement(&service_names_query(&cfg.measurement), json);
            }
            let store = SpanStore::from_config(&cfg);
            let names = store
                .get_service_names()
                .await
                .context("query service names")?;
            store.close().await?;
            print_or_json(&names, json, || print_names_human(&names, "services"))
        }
        Commands::Spans { service, dry_run } => {
            if dry_run {
                let statement = span_names_query(&cfg.measurement, &service).unwrap_or_default();
                return print_statement(&statement, json);
            }
            let store = SpanStore::from_config(&cfg);
            let names = store
                .get_span_names(&service)
                .await
                .with_context(|| format!("query span names of {service}"))?;
            store.close().await?;
            print_or_json(&names, json, || print_names_human(&names, "span names"))
        }
        Commands::Dependencies {
            end,
            lookback,
            counts,
            dry_run,
        } => {
            let end_ts = parse_end_millis(&end)?;
            let lookback = parse_lookback_millis(&lookback)?;
            if dry_run {
                let statement = if counts {
                    dependencies_query(&cfg.measurement, end_ts, lookback)
                } else {
                    dependency_spans_query(&cfg.measurement, end_ts, lookback)
                };
                return print_statement(&statement, json);
            }
            let store = SpanStore::from_config(&cfg);
            if counts {
                let buckets = store
                    .dependency_counts(end_ts, lookback)
                    .await
                    .context("query dependency counts")?;
                store.close().await?;
                print_or_json(&buckets, json, || print_buckets_human(&buckets))
            } else {
                let links = store
                    .get_dependencies(end_ts, lookback)
                    .await
                    .context("query dependencies")?;
                store.close().await?;
                print_or_json(&links, json, || print_dependencies_human(&links))
            }
        }
        Commands::Normalize { file } => {
            let spans = read_simple_spans(&file)?;
            let v1 = to_v1_spans(&spans);
            print_or_json(&v1, json, || print_v1_spans_human(&v1))
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| cfg.api_addr.clone());
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid api address {addr}"))?;
            eprintln!("zipflux serve");
            eprintln!("  influxdb: {} (db={})", cfg.url, cfg.database);
            eprintln!("  measurement: {}", cfg.measurement);
            eprintln!("  api: http://{addr}/api/v2");
            let store = Arc::new(SpanStore::from_config(&cfg));
            match store.check().await {
                Ok(version) => tracing::info!(%version, "influxdb reachable"),
                Err(err) => tracing::warn!(error = %err, "influxdb not reachable yet"),
            }
            api_server::run_api_server(store, addr).await
        }
    }
}

/// Accepts either a JSON array of spans or a single span object.
fn read_simple_spans(path: &Path) -> anyhow::Result<Vec<SimpleSpan>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut std::io::stdin(), &mut buf).context("read stdin")?;
        buf
    } else {
        std::fs::read(path).with_context(|| format!("read {}", path.display()))?
    };

    let first = raw.iter().find(|b| !b.is_ascii_whitespace());
    let spans = if first == Some(&b'[') {
        SimpleSpan::from_json_list(&raw)?
    } else {
        vec![SimpleSpan::from_json(&raw)?]
    };
    Ok(spans)
}

fn print_statement(statement: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "statement": statement }))?
        );
    } else {
        println!("{statement}");
    }
    Ok(())
}

fn print_or_json<T: Serialize + ?Sized>(
    value: &T,
    json: bool,
    human: impl FnOnce(),
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TracesArgs {
        TracesArgs {
            service: "web".into(),
            span: None,
            annotation: None,
            min_duration: None,
            max_duration: None,
            end: "1970-01-01T00:16:40Z".into(),
            lookback: "10m".into(),
            limit: 10,
        }
    }

    #[test]
    fn traces_args_build_a_request() {
        let req = TracesArgs {
            annotation: Some("error and env=prod".into()),
            min_duration: Some("2ms".into()),
            max_duration: Some("5000".into()),
            ..args()
        }
        .to_request()
        .unwrap();
        assert_eq!(req.end_ts, 1_000_000);
        assert_eq!(req.lookback, 600_000);
        assert_eq!(req.min_duration, Some(2000));
        assert_eq!(req.max_duration, Some(5000));
        assert_eq!(req.annotation_query.len(), 2);
    }

    #[test]
    fn traces_args_are_validated() {
        let err = TracesArgs {
            min_duration: Some("10ms".into()),
            max_duration: Some("1ms".into()),
            ..args()
        }
        .to_request();
        assert!(err.is_err());
        assert!(TracesArgs { limit: 0, ..args() }.to_request().is_err());
    }

    #[test]
    fn reads_single_span_or_list() {
        let dir = tempfile::tempdir().unwrap();
        let single = dir.path().join("one.json");
        std::fs::write(&single, r#" {"traceId": "a", "id": "b"}"#).unwrap();
        assert_eq!(read_simple_spans(&single).unwrap().len(), 1);

        let list = dir.path().join("many.json");
        std::fs::write(&list, r#"[{"traceId": "a", "id": "b"}, {"traceId": "a", "id": "c"}]"#)
            .unwrap();
        assert_eq!(read_simple_spans(&list).unwrap().len(), 2);

        assert!(read_simple_spans(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["zipflux", "--json", "traces", "--service", "web", "--dry-run"])
            .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Traces { dry_run: true, .. }));
    }
}
