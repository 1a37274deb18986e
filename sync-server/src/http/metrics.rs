//! Prometheus metrics endpoint.

use crate::server::{EngineMetrics, Unicloud};
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_types::SyncClassification;

/// Prometheus metrics handler.
///
/// Counters are monotonic since startup. The per-classification gauges are
/// read from the cached client status and are omitted if the store fails.
pub async fn metrics_handler(Extension(engine): Extension<Arc<Unicloud>>) -> impl IntoResponse {
    let mut body = render_counters(engine.metrics());

    if let Ok(clients) = engine.clients().list().await {
        let count = |wanted: Option<SyncClassification>| {
            clients.iter().filter(|c| c.sync_status == wanted).count()
        };
        body.push_str(&format!(
            r#"
# HELP unicloud_clients Registered clients by cached sync status
# TYPE unicloud_clients gauge
unicloud_clients{{sync_status="in_sync"}} {in_sync}
unicloud_clients{{sync_status="out_of_sync"}} {out_of_sync}
unicloud_clients{{sync_status="never"}} {never}
unicloud_clients{{sync_status="unknown"}} {unknown}
"#,
            in_sync = count(Some(SyncClassification::InSync)),
            out_of_sync = count(Some(SyncClassification::OutOfSync)),
            never = count(Some(SyncClassification::Never)),
            unknown = count(None),
        ));
    }

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn render_counters(m: &EngineMetrics) -> String {
    let counters = [
        ("events_opened_total", "Sync start reports accepted", &m.events_opened),
        ("events_closed_total", "Events closed by their client", &m.events_closed),
        ("events_interrupted_total", "Events marked KO as interrupted", &m.events_interrupted),
        ("status_refresh_runs_total", "Completed sync-status refresh runs", &m.status_refresh_runs),
        ("status_writes_total", "Cached sync status writes", &m.status_writes),
        ("evaluation_failures_total", "Clients skipped by a status refresh", &m.evaluation_failures),
        ("size_refresh_runs_total", "Completed share size refresh runs", &m.size_refresh_runs),
        ("aggregation_failures_total", "Shares skipped by a size refresh", &m.aggregation_failures),
        ("logs_pruned_total", "Event logs cleared by retention", &m.logs_pruned),
        ("job_aborts_total", "Background job runs aborted by a storage error", &m.job_aborts),
    ];

    let mut body = format!(
        r#"# HELP unicloud_info Server information
# TYPE unicloud_info gauge
unicloud_info{{version="{}"}} 1
"#,
        env!("CARGO_PKG_VERSION")
    );

    for (name, help, value) in counters {
        body.push_str(&format!(
            "\n# HELP unicloud_{name} {help}\n# TYPE unicloud_{name} counter\nunicloud_{name} {}\n",
            value.load(Ordering::Relaxed)
        ));
    }
    body
}
