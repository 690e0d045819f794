use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use jrm_core::{
    DownloadProgress, InstallPhase, LocalRuntime, ProgressListener, ProvisionError,
    ProvisionPrompt, ProvisionRequest, RemoteRuntimeDescriptor,
};

use super::{platform_or_current, print_json, provider};

#[derive(Args)]
pub struct ResolveArgs {
    /// Version specs, most preferred first (e.g. "11+", "1.8*", "1.8.0_145")
    #[arg(required = true)]
    pub versions: Vec<String>,
    /// Preferred vendor; "*" accepts any
    #[arg(long)]
    pub vendor: Option<String>,
    /// Target platform; defaults to the host
    #[arg(long)]
    pub platform: Option<String>,
    /// Manifest endpoint overriding the configured default
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Check the manifest for a newer runtime even when one is installed
    #[arg(long)]
    pub update_check: bool,
    /// Answer yes to download and update confirmations
    #[arg(long, short = 'y')]
    pub yes: bool,
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

/// Confirmations on the terminal. Runs the blocking read off the async workers.
struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    async fn ask(&self, question: String) -> bool {
        if self.assume_yes {
            eprintln!("{question} [y/N] y");
            return true;
        }
        tokio::task::spawn_blocking(move || {
            eprint!("{question} [y/N] ");
            let _ = std::io::stderr().flush();
            let mut answer = String::new();
            match std::io::stdin().lock().read_line(&mut answer) {
                Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

#[async_trait]
impl ProvisionPrompt for TerminalPrompt {
    async fn confirm_download(&self, candidate: &RemoteRuntimeDescriptor) -> bool {
        self.ask(format!(
            "Download {} {} ({}) from {}?",
            candidate.vendor,
            candidate.version,
            candidate.platform.display_label(),
            candidate.url
        ))
        .await
    }

    async fn confirm_update(
        &self,
        current: &LocalRuntime,
        candidate: &RemoteRuntimeDescriptor,
    ) -> bool {
        self.ask(format!(
            "Update {} to {}?",
            current.key(),
            candidate.version
        ))
        .await
    }

    async fn report_error(&self, message: &str, cause: &ProvisionError) {
        eprintln!("{message} ({})", cause.kind());
    }
}

struct StderrProgress;

impl ProgressListener for StderrProgress {
    fn on_progress(&self, progress: &DownloadProgress) {
        match (progress.phase, progress.percent()) {
            (InstallPhase::Downloading, Some(pct)) => {
                eprintln!("downloading {}: {pct:.0}%", progress.key)
            }
            (InstallPhase::Downloading, None) => {
                eprintln!("downloading {}: {} bytes", progress.key, progress.downloaded)
            }
            (InstallPhase::Verifying, _) => eprintln!("verifying {}", progress.key),
            (InstallPhase::Unpacking, _) => eprintln!("unpacking {}", progress.key),
            (InstallPhase::Finished, _) => eprintln!("installed {}", progress.key),
        }
    }
}

pub async fn run(args: ResolveArgs) -> Result<()> {
    let provider = Arc::new(provider(Some(Arc::new(StderrProgress)))?);
    let platform = platform_or_current(args.platform.as_deref())?;
    let mut request = ProvisionRequest::parse(&args.versions.join(" "), platform)?
        .check_for_updates(args.update_check);
    if let Some(vendor) = args.vendor.as_deref() {
        request = request.vendor(vendor);
    }
    if let Some(endpoint) = args.endpoint {
        request = request.endpoint(endpoint);
    }

    tracing::debug!(
        target: "jrm::cli",
        versions = ?args.versions,
        %platform,
        update_check = args.update_check,
        "resolving"
    );
    let prompt: Arc<dyn ProvisionPrompt> = Arc::new(TerminalPrompt {
        assume_yes: args.yes,
    });
    let runtime = provider.resolve_in_background(request, prompt).await??;
    print_json(&runtime, args.pretty)
}
