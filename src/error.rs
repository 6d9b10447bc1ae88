use thiserror::Error;

/// Substrings that mark a failure to reach the cluster at all, as opposed to
/// a failure of one particular request.
const CLUSTER_ACCESS_MARKERS: [&str; 4] = [
    "i/o timeout",
    "context deadline exceeded",
    "connection refused",
    "Bad Request",
];

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("no containers found in pod {pod}")]
    NoContainers { pod: String },

    #[error("error encoding YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
}

impl QueryError {
    /// Transport failures from the client are reported as cluster-access
    /// problems even when their text carries none of the known markers.
    pub fn cluster_access_warning(&self) -> Option<String> {
        let summary = self.summary();
        let transport = matches!(
            self,
            Self::Kube(kube::Error::HyperError(_) | kube::Error::Service(_))
        );
        if transport {
            return Some(banner_text(&summary));
        }
        cluster_access_warning(&summary)
    }

    /// Display text without the status dump kube appends to API errors.
    pub fn summary(&self) -> String {
        match self {
            Self::Kube(kube::Error::Api(status)) if !status.message.is_empty() => {
                status.message.clone()
            }
            _ => self.to_string(),
        }
    }
}

/// Returns the banner text shown instead of the pod list when `message`
/// describes a connectivity failure.
pub fn cluster_access_warning(message: &str) -> Option<String> {
    CLUSTER_ACCESS_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
        .then(|| banner_text(message))
}

fn banner_text(message: &str) -> String {
    format!("Error: {message} (validate cluster access and restart)")
}
