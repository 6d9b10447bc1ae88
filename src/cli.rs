use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kview",
    version,
    about = "A terminal inspector for Kubernetes pods."
)]
pub struct CliArgs {
    /// Path to the kubeconfig file (defaults to $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Preselect a pod by name
    #[arg(long)]
    pub pod: Option<String>,

    /// Runtime config file (defaults to $KVIEW_CONFIG, ./kview.yaml, ~/.config/kview/config.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn defaults_leave_everything_unset() {
        let args = CliArgs::parse_from(["kview"]);
        assert!(args.kubeconfig.is_none());
        assert!(args.namespace.is_none());
        assert!(!args.all_namespaces);
        assert_eq!(args.log_filter, "info");
    }

    #[test]
    fn parses_kubeconfig_and_pod() {
        let args = CliArgs::parse_from([
            "kview",
            "--kubeconfig",
            "/tmp/config",
            "-n",
            "web",
            "--pod",
            "api-0",
        ]);
        assert_eq!(
            args.kubeconfig.as_deref().and_then(|path| path.to_str()),
            Some("/tmp/config")
        );
        assert_eq!(args.namespace.as_deref(), Some("web"));
        assert_eq!(args.pod.as_deref(), Some("api-0"));
    }
}
