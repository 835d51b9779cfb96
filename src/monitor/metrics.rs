//! Process-wide counters exposed in the Prometheus text exposition format.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub tasks_submitted: AtomicU64,
    pub runs_started: AtomicU64,
    pub flows_submitted: AtomicU64,
    pub flow_runs_started: AtomicU64,
    pub helper_pod_exec_failures: AtomicU64,
    pub push_stream_connections: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        push_metric(&mut out, "flow_controller_tasks_submitted_total", self.tasks_submitted.load(Ordering::Relaxed));
        push_metric(&mut out, "flow_controller_runs_started_total", self.runs_started.load(Ordering::Relaxed));
        push_metric(&mut out, "flow_controller_flows_submitted_total", self.flows_submitted.load(Ordering::Relaxed));
        push_metric(&mut out, "flow_controller_flow_runs_started_total", self.flow_runs_started.load(Ordering::Relaxed));
        push_metric(&mut out, "flow_controller_helper_pod_exec_failures_total", self.helper_pod_exec_failures.load(Ordering::Relaxed));
        push_metric(&mut out, "flow_controller_push_stream_connections_total", self.push_stream_connections.load(Ordering::Relaxed));
        out
    }
}

fn push_metric(buf: &mut String, name: &str, value: u64) {
    buf.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_counter_name() {
        let metrics = Metrics::new();
        metrics.tasks_submitted.fetch_add(3, Ordering::Relaxed);
        let rendered = metrics.render();
        assert!(rendered.contains("flow_controller_tasks_submitted_total 3"));
        assert!(rendered.contains("flow_controller_runs_started_total 0"));
    }
}
