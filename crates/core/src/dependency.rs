use std::collections::{BTreeMap, HashMap};

use crate::constants::ERROR;
use crate::model::dependency::DependencyLink;
use crate::model::span::Span;

/// Derives service-to-service call edges from reconstructed traces.
///
/// A call is counted for every span whose parent is present in the same
/// trace and runs in a different service. Spans without a local endpoint
/// contribute nothing.
pub fn link(traces: &[Vec<Span>]) -> Vec<DependencyLink> {
    let mut edges: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();

    for trace in traces {
        let by_id: HashMap<&str, &Span> = trace.iter().map(|s| (s.id.as_str(), s)).collect();

        for span in trace {
            let Some(parent_id) = span.parent_id.as_deref() else {
                continue;
            };
            let Some(parent) = by_id.get(parent_id) else {
                continue;
            };
            let (Some(caller), Some(callee)) = (parent.service_name(), span.service_name()) else {
                continue;
            };
            if caller == callee {
                continue;
            }

            let entry = edges
                .entry((caller.to_string(), callee.to_string()))
                .or_insert((0, 0));
            entry.0 += 1;
            if span.tags.contains_key(ERROR) {
                entry.1 += 1;
            }
        }
    }

    edges
        .into_iter()
        .map(|((parent, child), (call_count, error_count))| DependencyLink {
            parent,
            child,
            call_count,
            error_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::span::Endpoint;

    fn span(trace: &str, id: &str, parent: Option<&str>, service: Option<&str>) -> Span {
        let mut b = Span::builder();
        b.trace_id(trace)
            .id(id)
            .parent_id(parent.map(str::to_string));
        if let Some(service) = service {
            b.local_endpoint(Endpoint::service(service));
        }
        b.build().unwrap()
    }

    #[test]
    fn counts_cross_service_calls() {
        let mut failed = span("t2", "b", Some("a"), Some("db"));
        failed.tags.insert("error".into(), "timeout".into());
        let traces = vec![
            vec![
                span("t1", "a", None, Some("web")),
                span("t1", "b", Some("a"), Some("db")),
                span("t1", "c", Some("a"), Some("web")),
            ],
            vec![span("t2", "a", None, Some("web")), failed],
        ];

        let links = link(&traces);
        assert_eq!(
            links,
            vec![DependencyLink {
                parent: "web".into(),
                child: "db".into(),
                call_count: 2,
                error_count: 1,
            }]
        );
    }

    #[test]
    fn skips_orphans_and_unnamed_services() {
        let traces = vec![vec![
            span("t1", "a", None, None),
            span("t1", "b", Some("a"), Some("db")),
            span("t1", "c", Some("missing"), Some("cache")),
        ]];
        assert!(link(&traces).is_empty());
    }

    #[test]
    fn links_are_sorted() {
        let traces = vec![vec![
            span("t1", "a", None, Some("web")),
            span("t1", "b", Some("a"), Some("search")),
            span("t1", "c", Some("a"), Some("auth")),
        ]];
        let children: Vec<_> = link(&traces).into_iter().map(|l| l.child).collect();
        assert_eq!(children, vec!["auth", "search"]);
    }
}
