//! `imgseo bulk`: generate (and optionally save) metadata for a whole page.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use imgseo_core::client::MetaApiClient;
use imgseo_core::config::ClientSettings;
use imgseo_core::http::ReqwestTransport;
use imgseo_core::orchestrator::{
    BulkError, BulkOrchestrator, BulkSummary, NoticeLevel, Operator, RowState, WorkRow,
};
use imgseo_core::types::WorkItem;
use serde::Deserialize;

pub struct BulkOptions {
    pub page: u64,
    pub focus: String,
    pub secondary: String,
    pub keywords: Option<PathBuf>,
    pub update: bool,
    pub assume_yes: bool,
}

/// Per-image keyword overrides, keyed by image id.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
struct Keywords {
    #[serde(default)]
    focus: String,
    #[serde(default)]
    secondary: String,
}

fn load_keywords(path: &Path) -> Result<HashMap<u64, Keywords>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read keywords file: {}", path.display()))?;
    let raw: HashMap<String, Keywords> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid keywords file: {}", path.display()))?;

    raw.into_iter()
        .map(|(id, keywords)| {
            id.trim()
                .parse::<u64>()
                .map(|id| (id, keywords))
                .map_err(|_| anyhow!("Invalid image id in keywords file: {:?}", id))
        })
        .collect()
}

/// Operator on the terminal: prompts on stdin, reports on stdout/stderr.
struct ConsoleOperator {
    assume_yes: bool,
}

impl Operator for ConsoleOperator {
    fn confirm(&self, prompt: &str, _count: usize) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", prompt);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn progress(&self, index: usize, total: usize) {
        eprintln!("Processing {}/{}...", index, total);
    }

    fn item_finished(&self, index: usize, row: &WorkRow) {
        let id = row.item.image_id;
        match &row.state {
            RowState::Generated(meta) => {
                println!("[{}] {:>8}  generated", index, id);
                println!("            title: {}", meta.title);
                println!("            alt:   {}", meta.alt);
            }
            RowState::Updated { title, alt } => {
                println!("[{}] {:>8}  saved", index, id);
                println!("            title: {}", title);
                println!("            alt:   {}", alt);
            }
            RowState::Empty => println!("[{}] {:>8}  empty response", index, id),
            RowState::Failed(failure) => {
                println!("[{}] {:>8}  error: {}", index, id, failure.display_message())
            }
            RowState::Pending | RowState::Processing => {}
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        let tag = match level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        eprintln!("{}: {}", tag, message);
    }
}

fn build_rows(
    image_ids: impl IntoIterator<Item = u64>,
    options: &BulkOptions,
    keywords: &HashMap<u64, Keywords>,
) -> Vec<WorkRow> {
    image_ids
        .into_iter()
        .map(|id| {
            let item = match keywords.get(&id) {
                Some(k) => WorkItem::new(id).with_keywords(&k.focus, &k.secondary),
                None => WorkItem::new(id).with_keywords(&options.focus, &options.secondary),
            };
            WorkRow::new(item)
        })
        .collect()
}

fn print_summary(summary: &BulkSummary) {
    println!(
        "{}: {} of {} processed, {} succeeded, {} failed",
        summary.action, summary.processed, summary.total, summary.success_count, summary.fail_count
    );
}

pub async fn run(
    client: MetaApiClient<ReqwestTransport>,
    settings: &ClientSettings,
    options: BulkOptions,
) -> Result<()> {
    let keywords = match &options.keywords {
        Some(path) => load_keywords(path)?,
        None => HashMap::new(),
    };

    let status = client
        .ping()
        .await
        .map_err(|f| anyhow!("{} is not reachable: {}", settings.server_url, f.display_message()))?;
    if !status.key_configured {
        tracing::warn!("server has no API key configured, generation is disabled");
    }

    let page = client
        .page_images(options.page)
        .await
        .map_err(|f| anyhow!(f.display_message()))?;
    if page.images.is_empty() {
        println!("No media-library images found on page {}.", options.page);
        return Ok(());
    }

    tracing::debug!(
        page_id = options.page,
        images = page.images.len(),
        overrides = keywords.len(),
        "starting bulk run"
    );
    let mut rows = build_rows(page.images.iter().map(|i| i.image_id), &options, &keywords);
    let orchestrator = BulkOrchestrator::new(client)
        .with_request_delay(settings.request_delay())
        .with_key_configured(status.key_configured);
    let operator = ConsoleOperator {
        assume_yes: options.assume_yes,
    };

    let summary = match orchestrator.run_generate_all(&mut rows, &operator).await {
        Ok(summary) => summary,
        Err(BulkError::Declined(_)) => return Ok(()),
        Err(BulkError::NoItems(_)) if !status.key_configured => {
            bail!("Please enter an API Key: the server has none configured.")
        }
        Err(e) => return Err(e.into()),
    };
    print_summary(&summary);
    if let Some(reason) = summary.halt_reason {
        bail!("Bulk generate stopped because {}", reason);
    }

    if options.update {
        match orchestrator.run_update_all(&mut rows, &operator).await {
            Ok(summary) => {
                print_summary(&summary);
                if let Some(reason) = summary.halt_reason {
                    bail!("Bulk update stopped because {}", reason);
                }
            }
            Err(BulkError::NoItems(_)) | Err(BulkError::Declined(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
