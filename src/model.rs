use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl NamespaceScope {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Named(namespace) => Some(namespace),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

/// Identity of a pod as seen in a listing.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
}

impl PodRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl Display for PodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Immutable copy of the fields shown in the status pane, taken at fetch time.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub age: String,
    pub node: String,
    pub containers: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DetailTab {
    Describe,
    Labels,
    Annotations,
    Events,
    Volumes,
    Logs,
}

impl DetailTab {
    pub const ALL: [Self; 6] = [
        Self::Describe,
        Self::Labels,
        Self::Annotations,
        Self::Events,
        Self::Volumes,
        Self::Logs,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Describe => "Describe",
            Self::Labels => "Labels",
            Self::Annotations => "Annotations",
            Self::Events => "Events",
            Self::Volumes => "Volumes",
            Self::Logs => "Logs",
        }
    }
}

/// Bound applied to a log request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogWindow {
    TailLines(i64),
    SinceSeconds(i64),
}

impl Default for LogWindow {
    fn default() -> Self {
        Self::TailLines(1_000)
    }
}

impl Display for LogWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TailLines(lines) => write!(f, "last {lines} lines"),
            Self::SinceSeconds(seconds) => write!(f, "last {seconds}s"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogWindow, NamespaceScope, PodRef};

    #[test]
    fn scope_display_matches_header_text() {
        assert_eq!(NamespaceScope::All.to_string(), "all");
        assert_eq!(
            NamespaceScope::Named("kube-system".to_string()).to_string(),
            "kube-system"
        );
        assert_eq!(NamespaceScope::All.namespace(), None);
    }

    #[test]
    fn pod_ref_renders_namespace_first() {
        assert_eq!(PodRef::new("web-0", "default").to_string(), "default/web-0");
    }

    #[test]
    fn default_log_window_is_line_bounded() {
        assert_eq!(LogWindow::default(), LogWindow::TailLines(1_000));
    }
}
