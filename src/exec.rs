//! Remote command execution inside a single container.
//!
//! Each call runs `sh -c <command>` over the websocket exec subresource on a
//! dedicated task. The task owns the stdout/stderr buffers; the caller joins
//! it and receives both buffers concatenated. Failures, including the
//! deadline, are written into the stderr buffer instead of being returned.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::AttachParams;
use kube::{Api, Client};
use std::fmt::Display;
use std::future::Future;
use tokio::io::AsyncRead;
use tokio::time::{Duration, Instant, timeout_at};
use tracing::{debug, warn};

use crate::model::PodRef;

pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEADLINE_HINT: &str = "\nINFO: command took too long to complete, try another command.";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExecTarget {
    pub pod: PodRef,
    pub container: String,
}

#[derive(Debug, Default)]
pub struct ExecCapture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ExecCapture {
    fn note_deadline(&mut self) {
        self.stderr.extend_from_slice(DEADLINE_HINT.as_bytes());
        self.stderr.push(b'\n');
    }

    fn note_failure(&mut self, error: impl Display) {
        self.stderr
            .extend_from_slice(format!("\n{error}\n").as_bytes());
    }

    /// Stdout followed by stderr, with no separator.
    pub fn combined(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&self.stderr));
        out
    }
}

pub async fn run_in_container(
    client: Client,
    target: ExecTarget,
    command: String,
    timeout: Duration,
) -> String {
    let task = tokio::spawn(async move {
        let deadline = Instant::now() + timeout;
        let mut capture = ExecCapture::default();
        stream_command(&client, &target, &command, deadline, &mut capture).await;
        capture
    });

    match task.await {
        Ok(capture) => capture.combined(),
        Err(error) => {
            warn!("exec task did not complete: {error}");
            format!("\n{error}\n")
        }
    }
}

async fn stream_command(
    client: &Client,
    target: &ExecTarget,
    command: &str,
    deadline: Instant,
    capture: &mut ExecCapture,
) {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &target.pod.namespace);
    let params = AttachParams::default()
        .container(target.container.clone())
        .stdin(false)
        .stdout(true)
        .stderr(true)
        .tty(false);
    debug!(
        "exec into {}:{} command={command:?}",
        target.pod, target.container
    );

    let upgrade = pods.exec(&target.pod.name, ["sh", "-c", command], &params);
    let mut process = match timeout_at(deadline, upgrade).await {
        Ok(Ok(process)) => process,
        Ok(Err(error)) => {
            warn!("exec upgrade failed for {}: {error}", target.pod);
            capture.note_failure(error);
            return;
        }
        Err(_) => {
            capture.note_deadline();
            return;
        }
    };

    let stdout = process.stdout();
    let stderr = process.stderr();
    let status = process.take_status();
    let timed_out = collect_streams(deadline, capture, stdout, stderr, status).await;
    if timed_out {
        process.abort();
        return;
    }

    // join consumes the process; an elapsed deadline drops it with the future
    match timeout_at(deadline, process.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => capture.note_failure(error),
        Err(_) => capture.note_deadline(),
    }
}

/// Drains both streams and the final status into `capture`. Returns true
/// when the deadline cut the command short.
async fn collect_streams<O, E, S>(
    deadline: Instant,
    capture: &mut ExecCapture,
    stdout: Option<O>,
    stderr: Option<E>,
    status: Option<S>,
) -> bool
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    S: Future<Output = Option<Status>>,
{
    let stdout_buffer = &mut capture.stdout;
    let stderr_buffer = &mut capture.stderr;

    let drain = async {
        let copy_stdout = async move {
            if let Some(mut reader) = stdout {
                tokio::io::copy(&mut reader, stdout_buffer).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let copy_stderr = async move {
            if let Some(mut reader) = stderr {
                tokio::io::copy(&mut reader, stderr_buffer).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        tokio::try_join!(copy_stdout, copy_stderr)?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        Ok::<_, std::io::Error>(status)
    };

    let outcome = timeout_at(deadline, drain).await;
    match outcome {
        Err(_) => {
            capture.note_deadline();
            true
        }
        Ok(Err(error)) => {
            capture.note_failure(error);
            false
        }
        Ok(Ok(Some(status))) if status.status.as_deref() == Some("Failure") => {
            let message = status
                .message
                .unwrap_or_else(|| "command terminated with a failure status".to_string());
            capture.note_failure(message);
            false
        }
        Ok(Ok(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{DEADLINE_HINT, ExecCapture, ExecTarget, collect_streams, run_in_container};
    use crate::model::PodRef;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
    use kube::{Client, Config};
    use std::future::{Ready, ready};
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
    use tokio::net::TcpListener;
    use tokio::time::{Duration, Instant};

    fn status(value: &str, message: Option<&str>) -> Status {
        Status {
            status: Some(value.to_string()),
            message: message.map(str::to_string),
            ..Status::default()
        }
    }

    async fn closed_stream(bytes: &[u8]) -> DuplexStream {
        let (mut writer, reader) = duplex(1024);
        writer.write_all(bytes).await.unwrap();
        drop(writer);
        reader
    }

    #[tokio::test]
    async fn successful_command_concatenates_stdout_then_stderr() {
        let mut capture = ExecCapture::default();
        let timed_out = collect_streams(
            Instant::now() + Duration::from_secs(5),
            &mut capture,
            Some(closed_stream(b"hello\n").await),
            Some(closed_stream(b"warn\n").await),
            Some(ready(Some(status("Success", None)))),
        )
        .await;

        assert!(!timed_out);
        assert_eq!(capture.combined(), "hello\nwarn\n");
    }

    #[tokio::test]
    async fn slow_command_reports_hint_and_keeps_partial_output() {
        let (mut writer, reader) = duplex(1024);
        writer.write_all(b"partial").await.unwrap();

        let mut capture = ExecCapture::default();
        let timed_out = collect_streams(
            Instant::now() + Duration::from_millis(50),
            &mut capture,
            Some(reader),
            None::<DuplexStream>,
            None::<Ready<Option<Status>>>,
        )
        .await;
        drop(writer);

        assert!(timed_out);
        let output = capture.combined();
        assert!(output.starts_with("partial"));
        assert!(output.contains("command took too long to complete, try another command"));
        assert!(output.ends_with(&format!("{DEADLINE_HINT}\n")));
    }

    #[tokio::test]
    async fn failure_status_is_written_to_stderr() {
        let mut capture = ExecCapture::default();
        let timed_out = collect_streams(
            Instant::now() + Duration::from_secs(5),
            &mut capture,
            Some(closed_stream(b"").await),
            Some(closed_stream(b"sh: nope: not found\n").await),
            Some(ready(Some(status(
                "Failure",
                Some("command terminated with non-zero exit code: exit code 127"),
            )))),
        )
        .await;

        assert!(!timed_out);
        assert_eq!(
            capture.combined(),
            "sh: nope: not found\n\ncommand terminated with non-zero exit code: exit code 127\n"
        );
    }

    #[tokio::test]
    async fn silent_api_server_runs_into_the_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = Config::new(format!("http://{addr}").parse().unwrap());
        let client = Client::try_from(config).unwrap();
        let target = ExecTarget {
            pod: PodRef::new("web-0", "default"),
            container: "app".to_string(),
        };

        let started = Instant::now();
        let output = run_in_container(
            client,
            target,
            "sleep 60".to_string(),
            Duration::from_millis(300),
        )
        .await;

        assert_eq!(output, format!("{DEADLINE_HINT}\n"));
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }

    #[tokio::test]
    async fn missing_streams_yield_empty_output() {
        let mut capture = ExecCapture::default();
        let timed_out = collect_streams(
            Instant::now() + Duration::from_secs(1),
            &mut capture,
            None::<DuplexStream>,
            None::<DuplexStream>,
            None::<Ready<Option<Status>>>,
        )
        .await;

        assert!(!timed_out);
        assert_eq!(capture.combined(), "");
    }
}
