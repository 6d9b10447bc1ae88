mod app;
mod cli;
mod config;
mod error;
mod exec;
mod format;
mod input;
mod k8s;
mod model;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::{App, AppCommand, ErrorSite};
use clap::Parser;
use cli::CliArgs;
use config::RuntimeConfig;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use k8s::KubeGateway;
use model::{DetailTab, NamespaceScope};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use watch::ContextWatcher;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let runtime = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(source) = runtime.source.as_deref() {
        info!("loaded runtime config from {source}");
    }

    let gateway = KubeGateway::new(
        args.kubeconfig.clone(),
        runtime.log_window,
        runtime.exec_timeout,
    )
    .await?;

    if args.all_namespaces && args.namespace.is_some() {
        warn!("both --all-namespaces and --namespace were provided, using all namespaces");
    }
    let namespace_scope = resolve_namespace_scope(&args, &gateway).await;

    let mut app = App::new(
        gateway.context().to_string(),
        gateway.cluster().to_string(),
        namespace_scope,
    );
    if let Some(pod) = args.pod.clone() {
        app.preselect_pod(pod);
    }

    run(&mut app, &gateway, &runtime).await
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::sink)
        .try_init();

    Ok(())
}

async fn resolve_namespace_scope(args: &CliArgs, gateway: &KubeGateway) -> NamespaceScope {
    if args.all_namespaces {
        return NamespaceScope::All;
    }
    if let Some(namespace) = &args.namespace {
        return NamespaceScope::Named(namespace.clone());
    }
    if let Some(pod) = &args.pod {
        match gateway.pod_namespace(pod).await {
            Ok(namespace) if !namespace.is_empty() => return NamespaceScope::Named(namespace),
            Ok(_) => warn!("pod {pod} not found in any namespace"),
            Err(error) => warn!("failed to resolve namespace for pod {pod}: {error}"),
        }
    }
    NamespaceScope::Named(gateway.default_namespace().to_string())
}

async fn run(app: &mut App, gateway: &KubeGateway, runtime: &RuntimeConfig) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, gateway, runtime).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    gateway: &KubeGateway,
    runtime: &RuntimeConfig,
) -> Result<()> {
    app.set_status("Loading pods…");
    terminal
        .draw(|frame| ui::render(frame, app))
        .context("failed to render terminal frame")?;
    execute_app_command(app, gateway, AppCommand::LoadNamespaces).await;
    execute_app_command(app, gateway, AppCommand::RefreshPods).await;

    let mut reader = EventStream::new();
    let (context_tx, mut context_rx) = mpsc::unbounded_channel::<String>();
    let watcher = ContextWatcher::start(
        gateway.kubeconfig_path().map(|path| path.to_path_buf()),
        gateway.context().to_string(),
        runtime.context_poll,
        context_tx,
    );

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            if command != AppCommand::None {
                                terminal
                                    .draw(|frame| ui::render(frame, app))
                                    .context("failed to render terminal frame")?;
                            }
                            execute_app_command(app, gateway, command).await;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_context = context_rx.recv() => {
                if let Some(context) = maybe_context {
                    info!("kubeconfig context switched to {context}");
                    app.set_context(context);
                }
            }
        }
    }

    watcher.stop();
    Ok(())
}

async fn execute_app_command(app: &mut App, gateway: &KubeGateway, command: AppCommand) {
    let mut next = command;
    // Selecting a pod chains into loading the active tab; a listing may chain
    // into a preselected pod.
    loop {
        next = match next {
            AppCommand::None => return,
            AppCommand::RefreshPods => {
                let scope = app.namespace_scope().clone();
                match gateway.list_pods(&scope).await {
                    Ok(pods) => app.set_pods(pods),
                    Err(error) => {
                        app.report_error(ErrorSite::PodList, &error);
                        AppCommand::None
                    }
                }
            }
            AppCommand::LoadNamespaces => {
                match gateway.list_namespaces().await {
                    Ok(namespaces) => app.set_namespaces(namespaces),
                    Err(error) => app.report_error(ErrorSite::NamespaceList, &error),
                }
                AppCommand::None
            }
            AppCommand::SelectPod { pod } => match gateway.pod_snapshot(&pod).await {
                Ok(snapshot) => {
                    app.set_snapshot(snapshot);
                    app.load_active_tab()
                }
                Err(error) => {
                    app.report_error(ErrorSite::Snapshot, &error);
                    AppCommand::None
                }
            },
            AppCommand::LoadTab {
                pod,
                tab,
                container,
            } => {
                let result = match (tab, container.as_deref()) {
                    (DetailTab::Describe, _) => gateway.pod_describe(&pod).await,
                    (DetailTab::Labels, _) => gateway.pod_labels(&pod).await,
                    (DetailTab::Annotations, _) => gateway.pod_annotations(&pod).await,
                    (DetailTab::Events, _) => gateway
                        .pod_events(&pod)
                        .await
                        .map(|events| events.join("\n")),
                    (DetailTab::Volumes, _) => gateway.pod_volumes(&pod).await,
                    (DetailTab::Logs, Some(container)) => gateway.pod_logs(&pod, container).await,
                    (DetailTab::Logs, None) => Ok(String::new()),
                };
                match result {
                    Ok(text) => app.set_tab_text(tab, text),
                    Err(error) => app.report_error(ErrorSite::Tab(tab), &error),
                }
                AppCommand::None
            }
            AppCommand::LoadYaml { pod } => {
                match gateway.pod_yaml(&pod).await {
                    Ok(yaml) => app.set_yaml_overlay(&pod, yaml),
                    Err(error) => app.report_error(ErrorSite::Yaml, &error),
                }
                AppCommand::None
            }
            AppCommand::Exec {
                pod,
                container,
                command,
            } => {
                let output = gateway.exec_in_container(&pod, &container, &command).await;
                app.set_exec_output(&pod, &container, &command, output);
                app.set_status(format!("Ran '{command}' in {pod}:{container}"));
                AppCommand::None
            }
        };
    }
}
