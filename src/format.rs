use k8s_openapi::api::core::v1::{Container, ContainerStatus, Event, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::jiff::Timestamp;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::error::QueryError;
use crate::model::PodSnapshot;

const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("static pattern compiles"));

/// One `key="value"` line per entry, each terminated by a newline.
pub fn map_lines(map: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        let _ = writeln!(out, "{key}=\"{value}\"");
    }
    out
}

pub fn pod_age(created: Option<&Time>, now: Timestamp) -> String {
    let Some(created) = created else {
        return "-".to_string();
    };

    let elapsed_ms = (now.as_millisecond() - created.0.as_millisecond()).max(0);
    // round half away from zero to whole seconds
    let seconds = (elapsed_ms + 500) / 1_000;
    let hours = seconds / 3_600;
    if hours >= 24 {
        return format!("{}d", hours / 24);
    }
    format_duration(seconds)
}

/// Renders whole seconds as `1h2m3s`, `4m0s`, `5s` or `0s`.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h{minutes}m{secs}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs}s")
    } else {
        format!("{secs}s")
    }
}

pub fn status_block(snapshot: &PodSnapshot) -> String {
    format!(
        "Status: {}\nAge: {}\nNamespace: {}\nNode: {}",
        snapshot.phase, snapshot.age, snapshot.namespace, snapshot.node
    )
}

pub fn event_line(event: &Event) -> String {
    let timestamp = event
        .event_time
        .as_ref()
        .map(|time| time.0)
        .or_else(|| event.first_timestamp.as_ref().map(|time| time.0))
        .or_else(|| event.last_timestamp.as_ref().map(|time| time.0))
        .or_else(|| {
            event
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|time| time.0)
        })
        .map(|ts| ts.strftime(EVENT_TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    let message = event.message.as_deref().unwrap_or_default();
    format!("~> {timestamp}, {message}")
}

pub fn volume_block(pod: &Pod) -> Result<String, QueryError> {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    if containers.is_empty() {
        return Err(QueryError::NoContainers {
            pod: pod.metadata.name.clone().unwrap_or_default(),
        });
    }

    let mut out = String::new();
    for container in containers {
        let _ = writeln!(out, "container name: {}", container.name);
        let mounts = container.volume_mounts.as_deref().unwrap_or_default();
        if mounts.is_empty() {
            out.push_str("- no volume mounts\n");
            continue;
        }
        for mount in mounts {
            let _ = writeln!(out, "- name: {}", mount.name);
            let _ = writeln!(out, "  mountPath: {}", mount.mount_path);
            if mount.read_only == Some(true) {
                out.push_str("  readOnly: true\n");
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Container-detail view: spec fields merged with the matching runtime status.
pub fn describe_block(pod: &Pod) -> String {
    let Some(spec) = pod.spec.as_ref() else {
        return "no pod spec available".to_string();
    };
    let status = pod.status.as_ref();
    let find_status = |statuses: Option<&Vec<ContainerStatus>>, name: &str| {
        statuses
            .into_iter()
            .flatten()
            .find(|entry| entry.name == name)
            .cloned()
    };

    let mut out = String::new();
    for container in spec.init_containers.as_deref().unwrap_or_default() {
        let runtime = find_status(
            status.and_then(|status| status.init_container_statuses.as_ref()),
            &container.name,
        );
        describe_container(&mut out, container, runtime.as_ref(), true);
    }
    for container in &spec.containers {
        let runtime = find_status(
            status.and_then(|status| status.container_statuses.as_ref()),
            &container.name,
        );
        describe_container(&mut out, container, runtime.as_ref(), false);
    }

    if out.is_empty() {
        out.push_str("no containers found\n");
    }
    out
}

fn describe_container(
    out: &mut String,
    container: &Container,
    runtime: Option<&ContainerStatus>,
    init: bool,
) {
    let kind = if init { "init container" } else { "container" };
    let _ = writeln!(out, "{kind} name: {}", container.name);
    let _ = writeln!(
        out,
        "  image: {}",
        container.image.as_deref().unwrap_or("-")
    );

    match runtime {
        Some(runtime) => {
            let _ = writeln!(out, "  state: {}", container_state(runtime));
            let _ = writeln!(out, "  ready: {}", runtime.ready);
            let _ = writeln!(out, "  restarts: {}", runtime.restart_count);
        }
        None => out.push_str("  state: Unknown\n"),
    }

    if let Some(command) = container.command.as_ref().filter(|value| !value.is_empty()) {
        let _ = writeln!(out, "  command: {}", command.join(" "));
    }
    if let Some(args) = container.args.as_ref().filter(|value| !value.is_empty()) {
        let _ = writeln!(out, "  args: {}", args.join(" "));
    }

    let ports = container
        .ports
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|port| {
            format!(
                "{}/{}",
                port.container_port,
                port.protocol.as_deref().unwrap_or("TCP")
            )
        })
        .collect::<Vec<_>>();
    if !ports.is_empty() {
        let _ = writeln!(out, "  ports: {}", ports.join(", "));
    }

    if let Some(resources) = container.resources.as_ref() {
        if let Some(requests) = resources.requests.as_ref().filter(|map| !map.is_empty()) {
            let _ = writeln!(out, "  requests: {}", quantities(requests));
        }
        if let Some(limits) = resources.limits.as_ref().filter(|map| !map.is_empty()) {
            let _ = writeln!(out, "  limits: {}", quantities(limits));
        }
    }

    let env_count = container.env.as_ref().map(Vec::len).unwrap_or(0);
    if env_count > 0 {
        let _ = writeln!(out, "  env: {env_count} variables");
    }
    out.push('\n');
}

fn container_state(status: &ContainerStatus) -> String {
    let Some(state) = status.state.as_ref() else {
        return "Unknown".to_string();
    };

    if let Some(running) = state.running.as_ref() {
        return match running.started_at.as_ref() {
            Some(started) => format!(
                "Running (started {})",
                started.0.strftime(EVENT_TIME_FORMAT)
            ),
            None => "Running".to_string(),
        };
    }
    if let Some(waiting) = state.waiting.as_ref() {
        return waiting
            .reason
            .clone()
            .filter(|reason| !reason.is_empty())
            .map(|reason| format!("Waiting ({reason})"))
            .unwrap_or_else(|| "Waiting".to_string());
    }
    if let Some(terminated) = state.terminated.as_ref() {
        let reason = terminated
            .reason
            .clone()
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| "Exited".to_string());
        return format!("Terminated ({reason}, exit code {})", terminated.exit_code);
    }
    "Unknown".to_string()
}

fn quantities(
    map: &BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
) -> String {
    map.iter()
        .map(|(key, value)| format!("{key}={}", value.0))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE.replace_all(input, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::{
        describe_block, event_line, format_duration, map_lines, pod_age, status_block,
        strip_ansi, volume_block,
    };
    use crate::model::PodSnapshot;
    use k8s_openapi::api::core::v1::{Event, Pod};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::jiff::Timestamp;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ts(value: &str) -> Timestamp {
        value.parse().unwrap()
    }

    fn parse_lines(text: &str) -> BTreeMap<String, String> {
        text.split('\n')
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (key, rest) = line.split_once("=\"").unwrap();
                let value = rest.strip_suffix('"').unwrap();
                (key.to_string(), value.to_string())
            })
            .collect()
    }

    #[test]
    fn map_lines_renders_one_quoted_pair_per_line() {
        let map = BTreeMap::from([("key".to_string(), "value".to_string())]);
        assert_eq!(map_lines(&map), "key=\"value\"\n");
        assert_eq!(map_lines(&BTreeMap::new()), "");
    }

    proptest! {
        #[test]
        fn map_lines_parses_back(
            map in prop::collection::btree_map("[a-z0-9./-]{1,20}", "[ -~]{0,24}", 0..8)
        ) {
            prop_assert_eq!(parse_lines(&map_lines(&map)), map);
        }
    }

    #[test]
    fn age_under_a_day_uses_duration_rendering() {
        let created = Time(ts("2024-03-01T10:00:00Z"));
        assert_eq!(
            pod_age(Some(&created), ts("2024-03-01T12:03:01Z")),
            "2h3m1s"
        );
        assert_eq!(pod_age(Some(&created), ts("2024-03-01T10:05:00Z")), "5m0s");
        assert_eq!(pod_age(Some(&created), ts("2024-03-01T10:00:45Z")), "45s");
        assert_eq!(pod_age(Some(&created), ts("2024-03-01T10:00:00Z")), "0s");
    }

    #[test]
    fn age_rounds_to_nearest_second() {
        let created = Time(ts("2024-03-01T10:00:00Z"));
        assert_eq!(
            pod_age(Some(&created), ts("2024-03-01T10:00:01.6Z")),
            "2s"
        );
        assert_eq!(
            pod_age(Some(&created), ts("2024-03-01T10:00:01.4Z")),
            "1s"
        );
    }

    #[test]
    fn age_of_a_day_or_more_drops_remainder_hours() {
        let created = Time(ts("2024-03-01T10:00:00Z"));
        assert_eq!(pod_age(Some(&created), ts("2024-03-02T10:00:00Z")), "1d");
        assert_eq!(pod_age(Some(&created), ts("2024-03-04T09:59:59Z")), "2d");
        assert_eq!(pod_age(Some(&created), ts("2024-03-01T09:59:59Z")), "0s");
        assert_eq!(pod_age(None, ts("2024-03-01T10:00:00Z")), "-");
    }

    #[test]
    fn duration_rendering_keeps_zero_components() {
        assert_eq!(format_duration(3_600), "1h0m0s");
        assert_eq!(format_duration(60), "1m0s");
        assert_eq!(format_duration(86_399), "23h59m59s");
    }

    #[test]
    fn status_block_lists_fields_in_order() {
        let snapshot = PodSnapshot {
            name: "web-0".to_string(),
            namespace: "default".to_string(),
            phase: "Running".to_string(),
            age: "3d".to_string(),
            node: "node-a".to_string(),
            ..PodSnapshot::default()
        };
        assert_eq!(
            status_block(&snapshot),
            "Status: Running\nAge: 3d\nNamespace: default\nNode: node-a"
        );
    }

    #[test]
    fn event_line_prefers_event_time() {
        let event: Event = serde_json::from_value(json!({
            "metadata": { "name": "web-0.1", "namespace": "default" },
            "involvedObject": { "kind": "Pod", "name": "web-0" },
            "eventTime": "2024-03-01T10:00:00.000000Z",
            "firstTimestamp": "2024-02-01T10:00:00Z",
            "message": "Pulled image"
        }))
        .unwrap();
        assert_eq!(event_line(&event), "~> 2024-03-01 10:00:00, Pulled image");
    }

    #[test]
    fn event_line_falls_back_to_first_timestamp() {
        let event: Event = serde_json::from_value(json!({
            "metadata": { "name": "web-0.2" },
            "involvedObject": { "kind": "Pod", "name": "web-0" },
            "firstTimestamp": "2024-02-01T08:30:15Z",
            "message": "Scheduled"
        }))
        .unwrap();
        assert_eq!(event_line(&event), "~> 2024-02-01 08:30:15, Scheduled");
    }

    fn pod_with_mounts() -> Pod {
        serde_json::from_value(json!({
            "metadata": { "name": "web-0", "namespace": "default" },
            "spec": {
                "containers": [
                    {
                        "name": "app",
                        "image": "nginx:1.25",
                        "ports": [{ "containerPort": 80 }],
                        "resources": { "limits": { "cpu": "500m", "memory": "128Mi" } },
                        "env": [{ "name": "A", "value": "1" }],
                        "volumeMounts": [
                            { "name": "data", "mountPath": "/data" },
                            { "name": "token", "mountPath": "/var/run/secrets", "readOnly": true }
                        ]
                    },
                    { "name": "sidecar", "image": "busybox" }
                ]
            },
            "status": {
                "containerStatuses": [
                    {
                        "name": "app",
                        "image": "nginx:1.25",
                        "imageID": "",
                        "ready": true,
                        "restartCount": 2,
                        "state": { "waiting": { "reason": "CrashLoopBackOff" } }
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn volume_block_lists_mounts_per_container() {
        let block = volume_block(&pod_with_mounts()).unwrap();
        assert_eq!(
            block,
            "container name: app\n\
             - name: data\n  mountPath: /data\n\
             - name: token\n  mountPath: /var/run/secrets\n  readOnly: true\n\n\
             container name: sidecar\n\
             - no volume mounts\n"
        );
    }

    #[test]
    fn volume_block_requires_containers() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "empty" },
            "spec": { "containers": [] }
        }))
        .unwrap();
        let error = volume_block(&pod).unwrap_err();
        assert_eq!(error.to_string(), "no containers found in pod empty");
    }

    #[test]
    fn describe_block_merges_runtime_status() {
        let block = describe_block(&pod_with_mounts());
        assert!(block.contains("container name: app\n  image: nginx:1.25\n"));
        assert!(block.contains("  state: Waiting (CrashLoopBackOff)\n"));
        assert!(block.contains("  restarts: 2\n"));
        assert!(block.contains("  ports: 80/TCP\n"));
        assert!(block.contains("  limits: cpu=500m, memory=128Mi\n"));
        assert!(block.contains("  env: 1 variables\n"));
        assert!(block.contains("container name: sidecar\n  image: busybox\n  state: Unknown\n"));
    }

    #[test]
    fn strip_ansi_removes_color_sequences() {
        assert_eq!(
            strip_ansi("\x1b[1;32mok\x1b[0m done\x1b[K"),
            "ok done"
        );
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
