use crate::error::QueryError;
use crate::format;
use crate::input::Action;
use crate::model::{DetailTab, NamespaceScope, PodRef, PodSnapshot};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use tracing::warn;

const PAGE_STEP: isize = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Filter,
    Exec,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FocusPane {
    Pods,
    Detail,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OverlayKind {
    Yaml,
    Exec,
}

/// Where a failed query was issued from; decides how the failure is shown.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorSite {
    PodList,
    NamespaceList,
    Snapshot,
    Tab(DetailTab),
    Yaml,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    RefreshPods,
    LoadNamespaces,
    SelectPod {
        pod: PodRef,
    },
    LoadTab {
        pod: PodRef,
        tab: DetailTab,
        container: Option<String>,
    },
    LoadYaml {
        pod: PodRef,
    },
    Exec {
        pod: PodRef,
        container: String,
        command: String,
    },
}

#[derive(Debug, Clone)]
struct Overlay {
    kind: OverlayKind,
    title: String,
    body: String,
    scroll: u16,
}

#[derive(Debug, Clone)]
struct NamespacePicker {
    entries: Vec<NamespaceScope>,
    selected: usize,
}

pub struct App {
    running: bool,
    mode: InputMode,
    focus: FocusPane,
    context: String,
    cluster: String,
    namespace_scope: NamespaceScope,
    namespaces: Vec<String>,
    namespace_picker: Option<NamespacePicker>,
    pods: Vec<PodRef>,
    filter: String,
    selected: usize,
    pending_pod: Option<String>,
    active_pod: Option<PodRef>,
    snapshot: Option<PodSnapshot>,
    detail_tab: DetailTab,
    detail_text: HashMap<DetailTab, String>,
    detail_scroll: u16,
    container_index: usize,
    overlay: Option<Overlay>,
    banner: Option<String>,
    pods_loaded: bool,
    input: String,
    status: String,
    show_help: bool,
    refreshed_at: Option<DateTime<Local>>,
}

impl App {
    pub fn new(context: String, cluster: String, namespace_scope: NamespaceScope) -> Self {
        Self {
            running: true,
            mode: InputMode::Normal,
            focus: FocusPane::Pods,
            context,
            cluster,
            namespace_scope,
            namespaces: Vec::new(),
            namespace_picker: None,
            pods: Vec::new(),
            filter: String::new(),
            selected: 0,
            pending_pod: None,
            active_pod: None,
            snapshot: None,
            detail_tab: DetailTab::Describe,
            detail_text: HashMap::new(),
            detail_scroll: 0,
            container_index: 0,
            overlay: None,
            banner: None,
            pods_loaded: false,
            input: String::new(),
            status: "Select application (pod)...".to_string(),
            show_help: false,
            refreshed_at: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn focus(&self) -> FocusPane {
        self.focus
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn namespace_scope(&self) -> &NamespaceScope {
        &self.namespace_scope
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Local>> {
        self.refreshed_at
    }

    pub fn detail_tab(&self) -> DetailTab {
        self.detail_tab
    }

    pub fn detail_scroll(&self) -> u16 {
        self.detail_scroll
    }

    pub fn active_pod(&self) -> Option<&PodRef> {
        self.active_pod.as_ref()
    }

    pub fn snapshot(&self) -> Option<&PodSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = normalize_status_text(status.into());
    }

    /// Called by the context watcher when the kubeconfig switches context.
    pub fn set_context(&mut self, context: String) {
        if context != self.context {
            self.set_status(format!("Cluster context changed to {context}"));
            self.context = context;
        }
    }

    /// Pod name to select once the next listing arrives.
    pub fn preselect_pod(&mut self, name: String) {
        self.pending_pod = Some(name);
    }

    pub fn set_pods(&mut self, pods: Vec<PodRef>) -> AppCommand {
        self.banner = None;
        self.pods_loaded = true;
        self.pods = pods;
        self.refreshed_at = Some(Local::now());
        self.clamp_selection();
        self.set_status(format!(
            "Loaded {} pods in namespace scope {}",
            self.pods.len(),
            self.namespace_scope
        ));

        let Some(name) = self.pending_pod.take() else {
            return AppCommand::None;
        };
        let position = self.visible_pods().iter().position(|pod| pod.name == name);
        match position {
            Some(index) => {
                self.selected = index;
                self.select_current_pod()
            }
            None => {
                self.set_status(format!("Pod {name} not found in {}", self.namespace_scope));
                AppCommand::None
            }
        }
    }

    pub fn set_namespaces(&mut self, namespaces: Vec<String>) {
        self.banner = None;
        self.namespaces = namespaces;
        if let Some(picker) = self.namespace_picker.as_mut() {
            picker.entries = namespace_entries(&self.namespaces);
            picker.selected = picker
                .entries
                .iter()
                .position(|entry| entry == &self.namespace_scope)
                .unwrap_or_else(|| picker.selected.min(picker.entries.len().saturating_sub(1)));
        }
    }

    pub fn set_snapshot(&mut self, snapshot: PodSnapshot) {
        self.container_index = self
            .container_index
            .min(snapshot.containers.len().saturating_sub(1));
        self.snapshot = Some(snapshot);
    }

    pub fn set_tab_text(&mut self, tab: DetailTab, text: String) {
        self.detail_text.insert(tab, text);
    }

    pub fn set_yaml_overlay(&mut self, pod: &PodRef, yaml: String) {
        self.overlay = Some(Overlay {
            kind: OverlayKind::Yaml,
            title: format!("Application (Pod): {}", pod.name),
            body: yaml,
            scroll: 0,
        });
    }

    /// Appends one command and its output to the exec transcript.
    pub fn set_exec_output(&mut self, pod: &PodRef, container: &str, command: &str, output: String) {
        let entry = format!("$ {command}\n{output}");
        match self.overlay.as_mut() {
            Some(overlay) if overlay.kind == OverlayKind::Exec => {
                if !overlay.body.is_empty() && !overlay.body.ends_with('\n') {
                    overlay.body.push('\n');
                }
                overlay.body.push_str(&entry);
            }
            _ => {
                self.overlay = Some(Overlay {
                    kind: OverlayKind::Exec,
                    title: format!("Container Name: {container} ({pod})"),
                    body: entry,
                    scroll: 0,
                });
            }
        }
    }

    /// Single place that decides how a failed query is presented. Only a
    /// listing that fails before any pods were loaded raises the banner.
    pub fn report_error(&mut self, site: ErrorSite, error: &QueryError) {
        warn!("query failed at {site:?}: {error}");
        let initial_listing =
            !self.pods_loaded && matches!(site, ErrorSite::PodList | ErrorSite::NamespaceList);
        if initial_listing && let Some(warning) = error.cluster_access_warning() {
            self.banner = Some(warning);
            self.mode = InputMode::Normal;
            self.input.clear();
            self.overlay = None;
            self.namespace_picker = None;
            return;
        }

        let error = error.summary();
        match site {
            ErrorSite::PodList => self.set_status(format!("Failed to list pods: {error}")),
            ErrorSite::NamespaceList => {
                self.set_status(format!("Failed to list namespaces: {error}"))
            }
            ErrorSite::Snapshot => {
                self.snapshot = None;
                self.set_status(format!("Failed to get pod detail: {error}"));
            }
            ErrorSite::Tab(tab) => {
                self.detail_text.insert(tab, format!("error: {error}"));
                self.set_status(format!("Failed to load {}: {error}", tab.title()));
            }
            ErrorSite::Yaml => self.set_status(format!("Failed to export YAML: {error}")),
        }
    }

    pub fn visible_pods(&self) -> Vec<&PodRef> {
        self.pods
            .iter()
            .filter(|pod| self.filter.is_empty() || pod.name.contains(&self.filter))
            .collect()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn detail_text(&self) -> &str {
        self.detail_text
            .get(&self.detail_tab)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn status_block(&self) -> String {
        match self.snapshot.as_ref() {
            Some(snapshot) => format::status_block(snapshot),
            None => "Status: \nAge: \nNamespace: \nNode: ".to_string(),
        }
    }

    pub fn containers(&self) -> &[String] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.containers.as_slice())
            .unwrap_or_default()
    }

    pub fn selected_container(&self) -> Option<&str> {
        self.containers()
            .get(self.container_index)
            .map(String::as_str)
    }

    pub fn overlay_title(&self) -> Option<&str> {
        self.overlay.as_ref().map(|overlay| overlay.title.as_str())
    }

    pub fn overlay_body(&self) -> Option<&str> {
        self.overlay.as_ref().map(|overlay| overlay.body.as_str())
    }

    pub fn overlay_kind(&self) -> Option<OverlayKind> {
        self.overlay.as_ref().map(|overlay| overlay.kind)
    }

    pub fn overlay_scroll(&self) -> u16 {
        self.overlay.as_ref().map(|overlay| overlay.scroll).unwrap_or(0)
    }

    pub fn namespace_picker_entries(&self) -> Option<(&[NamespaceScope], usize)> {
        self.namespace_picker
            .as_ref()
            .map(|picker| (picker.entries.as_slice(), picker.selected))
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
            if matches!(action, Action::ClearOverlay) {
                return AppCommand::None;
            }
        }

        if self.banner.is_some() {
            return match action {
                Action::Quit => self.quit(),
                Action::Refresh => {
                    self.set_status("Retrying cluster access");
                    AppCommand::RefreshPods
                }
                _ => AppCommand::None,
            };
        }

        if self.mode != InputMode::Normal {
            return self.apply_input_action(action);
        }

        if self.namespace_picker.is_some() {
            return self.apply_picker_action(action);
        }

        match action {
            Action::Quit => self.quit(),
            Action::Down => self.move_by(1),
            Action::Up => self.move_by(-1),
            Action::PageDown => self.move_by(PAGE_STEP),
            Action::PageUp => self.move_by(-PAGE_STEP),
            Action::Top => self.move_by(isize::MIN / 2),
            Action::Bottom => self.move_by(isize::MAX / 2),
            Action::NextTab => self.switch_tab_by_offset(1),
            Action::PrevTab => self.switch_tab_by_offset(-1),
            Action::NextContainer => self.switch_container_by_offset(1),
            Action::PrevContainer => self.switch_container_by_offset(-1),
            Action::ToggleFocus => {
                self.focus = match self.focus {
                    FocusPane::Pods => FocusPane::Detail,
                    FocusPane::Detail => FocusPane::Pods,
                };
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::SelectPod => self.select_current_pod(),
            Action::Refresh => {
                self.clear_pod_detail();
                self.set_status("Refreshing pods");
                AppCommand::RefreshPods
            }
            Action::StartFilter => {
                self.mode = InputMode::Filter;
                self.input = self.filter.clone();
                AppCommand::None
            }
            Action::StartExec => self.start_exec(),
            Action::ShowYaml => match self.active_pod.clone() {
                Some(pod) => AppCommand::LoadYaml { pod },
                None => {
                    self.set_status("Select a pod first");
                    AppCommand::None
                }
            },
            Action::PickNamespace => {
                let entries = namespace_entries(&self.namespaces);
                let selected = entries
                    .iter()
                    .position(|entry| entry == &self.namespace_scope)
                    .unwrap_or(0);
                self.namespace_picker = Some(NamespacePicker { entries, selected });
                AppCommand::LoadNamespaces
            }
            Action::ClearOverlay => {
                self.overlay = None;
                AppCommand::None
            }
            Action::SubmitInput
            | Action::CancelInput
            | Action::Backspace
            | Action::InputChar(_) => AppCommand::None,
        }
    }

    fn apply_input_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Quit => self.quit(),
            Action::InputChar(c) => {
                self.input.push(c);
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            Action::CancelInput | Action::ClearOverlay => {
                if self.mode == InputMode::Exec {
                    self.overlay = None;
                }
                self.mode = InputMode::Normal;
                self.input.clear();
                AppCommand::None
            }
            Action::SubmitInput => self.submit_input(),
            Action::Down => self.scroll_overlay(1),
            Action::Up => self.scroll_overlay(-1),
            Action::PageDown => self.scroll_overlay(PAGE_STEP),
            Action::PageUp => self.scroll_overlay(-PAGE_STEP),
            _ => AppCommand::None,
        }
    }

    fn apply_picker_action(&mut self, action: Action) -> AppCommand {
        let Some(picker) = self.namespace_picker.as_mut() else {
            return AppCommand::None;
        };
        match action {
            Action::Quit => self.quit(),
            Action::Down | Action::Up | Action::PageDown | Action::PageUp => {
                let delta = match action {
                    Action::Down => 1,
                    Action::Up => -1,
                    Action::PageDown => PAGE_STEP,
                    _ => -PAGE_STEP,
                };
                picker.selected = step_index(picker.selected, delta, picker.entries.len());
                AppCommand::None
            }
            Action::SelectPod => {
                let chosen = picker.entries.get(picker.selected).cloned();
                self.namespace_picker = None;
                let Some(scope) = chosen else {
                    return AppCommand::None;
                };
                self.namespace_scope = scope;
                self.filter.clear();
                self.selected = 0;
                self.clear_pod_detail();
                self.set_status(format!("Namespace scope: {}", self.namespace_scope));
                AppCommand::RefreshPods
            }
            Action::ClearOverlay | Action::PickNamespace => {
                self.namespace_picker = None;
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn submit_input(&mut self) -> AppCommand {
        match self.mode {
            InputMode::Normal => AppCommand::None,
            InputMode::Filter => {
                self.filter = self.input.trim().to_string();
                self.mode = InputMode::Normal;
                self.input.clear();
                self.selected = 0;
                if self.filter.is_empty() {
                    self.set_status("Filter cleared");
                } else {
                    self.set_status(format!("Filter: '{}'", self.filter));
                }
                AppCommand::None
            }
            InputMode::Exec => {
                let command = self.input.trim().to_string();
                self.input.clear();
                if command.is_empty() {
                    return AppCommand::None;
                }
                let pod = self.active_pod.clone();
                let container = self.selected_container().map(str::to_string);
                let (Some(pod), Some(container)) = (pod, container) else {
                    self.mode = InputMode::Normal;
                    self.set_status("No container selected for exec");
                    return AppCommand::None;
                };
                self.set_status(format!("Running '{command}' in {pod}:{container}"));
                AppCommand::Exec {
                    pod,
                    container,
                    command,
                }
            }
        }
    }

    fn quit(&mut self) -> AppCommand {
        self.running = false;
        self.set_status("Exit requested");
        AppCommand::None
    }

    fn move_by(&mut self, delta: isize) -> AppCommand {
        if self.overlay.is_some() {
            return self.scroll_overlay(delta);
        }
        match self.focus {
            FocusPane::Pods => {
                self.selected = step_index(self.selected, delta, self.visible_pods().len());
            }
            FocusPane::Detail => {
                self.detail_scroll = step_scroll(self.detail_scroll, delta);
            }
        }
        AppCommand::None
    }

    fn scroll_overlay(&mut self, delta: isize) -> AppCommand {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.scroll = step_scroll(overlay.scroll, delta);
        }
        AppCommand::None
    }

    fn select_current_pod(&mut self) -> AppCommand {
        let Some(pod) = self.visible_pods().get(self.selected).map(|pod| (*pod).clone()) else {
            return AppCommand::None;
        };
        self.clear_pod_detail();
        self.active_pod = Some(pod.clone());
        self.set_status(format!("Application (Pod): {}", pod.name));
        AppCommand::SelectPod { pod }
    }

    /// Command that loads the active tab for the active pod, if any.
    pub fn load_active_tab(&self) -> AppCommand {
        let Some(pod) = self.active_pod.clone() else {
            return AppCommand::None;
        };
        let container = match self.detail_tab {
            DetailTab::Logs => match self.selected_container() {
                Some(container) => Some(container.to_string()),
                None => return AppCommand::None,
            },
            _ => None,
        };
        AppCommand::LoadTab {
            pod,
            tab: self.detail_tab,
            container,
        }
    }

    fn switch_tab_by_offset(&mut self, offset: isize) -> AppCommand {
        let tabs = DetailTab::ALL;
        let current = tabs
            .iter()
            .position(|tab| *tab == self.detail_tab)
            .unwrap_or(0) as isize;
        let next = (current + offset).rem_euclid(tabs.len() as isize) as usize;
        self.detail_tab = tabs[next];
        self.detail_scroll = 0;
        self.load_active_tab()
    }

    fn switch_container_by_offset(&mut self, offset: isize) -> AppCommand {
        let count = self.containers().len();
        if count == 0 {
            return AppCommand::None;
        }
        self.container_index =
            (self.container_index as isize + offset).rem_euclid(count as isize) as usize;
        self.detail_scroll = 0;
        if let Some(container) = self.selected_container() {
            let message = format!("Container: {container}");
            self.set_status(message);
        }
        if self.detail_tab == DetailTab::Logs {
            self.load_active_tab()
        } else {
            AppCommand::None
        }
    }

    fn start_exec(&mut self) -> AppCommand {
        let Some(pod) = self.active_pod.clone() else {
            self.set_status("Select a pod first");
            return AppCommand::None;
        };
        let Some(container) = self.selected_container().map(str::to_string) else {
            self.set_status(format!("No containers loaded for {pod}"));
            return AppCommand::None;
        };
        self.mode = InputMode::Exec;
        self.input.clear();
        self.overlay = Some(Overlay {
            kind: OverlayKind::Exec,
            title: format!("Container Name: {container} ({pod})"),
            body: String::new(),
            scroll: 0,
        });
        self.set_status(format!("Enter a command for {container}"));
        AppCommand::None
    }

    fn clear_pod_detail(&mut self) {
        self.active_pod = None;
        self.snapshot = None;
        self.detail_text.clear();
        self.detail_scroll = 0;
        self.container_index = 0;
        self.overlay = None;
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_pods().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

fn namespace_entries(namespaces: &[String]) -> Vec<NamespaceScope> {
    std::iter::once(NamespaceScope::All)
        .chain(
            namespaces
                .iter()
                .map(|namespace| NamespaceScope::Named(namespace.clone())),
        )
        .collect()
}

fn step_index(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let max_index = len.saturating_sub(1) as isize;
    (current.min(max_index as usize) as isize)
        .saturating_add(delta)
        .clamp(0, max_index) as usize
}

fn step_scroll(current: u16, delta: isize) -> u16 {
    (current as isize)
        .saturating_add(delta)
        .clamp(0, u16::MAX as isize) as u16
}

fn normalize_status_text(status: String) -> String {
    const MAX_STATUS_LEN: usize = 180;
    if status.chars().count() <= MAX_STATUS_LEN {
        return status;
    }

    let mut shortened = status
        .chars()
        .take(MAX_STATUS_LEN.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}
