use anyhow::{anyhow, Context, Result};
use clap::Parser;
use live_preview_core::{
    DocumentWatcher, PreviewConfig, PreviewOutput, Previewer, Rendered, TemplateRegistry,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Keep an HTML preview of a markdown file up to date.
///
/// The file is rendered once, then re-rendered on every change. Only the
/// blocks that changed are rendered again.
#[derive(Parser, Debug)]
#[clap(name = "live_preview", version)]
struct Args {
    /// Markdown file to preview.
    file: PathBuf,

    /// Path to the config file, defaults are used if it does not exist.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Template to wrap the rendered blocks in, e.g. `article` or `document`.
    #[clap(long)]
    template: Option<String>,

    /// Write the preview to this file instead of stdout.
    #[clap(long)]
    output: Option<PathBuf>,

    /// Write the log to this file instead of stderr.
    #[clap(long)]
    log: Option<PathBuf>,

    /// Emit the serialized preview output as JSON instead of HTML.
    #[clap(long)]
    json: bool,

    /// Render once and exit instead of watching the file.
    #[clap(long)]
    once: bool,
}

fn env_filter(config: &PreviewConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = config.log.max_level.clone();
        if !config.log.log_target.is_empty() {
            directives.push(',');
            directives.push_str(&config.log.log_target);
        }
        EnvFilter::new(directives)
    })
}

fn init_logging(args: &Args, config: &PreviewConfig) -> Result<Option<WorkerGuard>> {
    let maybe_log = args
        .log
        .clone()
        .or_else(|| config.log.log_file.as_ref().map(PathBuf::from));

    let Some(log_path) = maybe_log else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(config))
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .init();
        return Ok(None);
    };

    if let Ok(metadata) = std::fs::metadata(&log_path) {
        if log_path.is_file() && metadata.len() > 8 * 1024 * 1024 {
            std::fs::remove_file(&log_path)?;
        }
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {log_path:?}"))?;

    let directory = log_path
        .parent()
        .ok_or_else(|| anyhow!("{log_path:?} has no parent"))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_line_number(true)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

struct Session {
    previewer: Previewer,
    file: PathBuf,
    output: Option<PathBuf>,
    template: Option<String>,
    json: bool,
}

impl Session {
    async fn render(&mut self) -> Result<()> {
        let raw = tokio::fs::read_to_string(&self.file)
            .await
            .with_context(|| format!("failed to read {}", self.file.display()))?;

        let started = Instant::now();
        let Rendered { output, report } = self.previewer.render(&raw, self.template.as_deref())?;

        if let Some(err) = &report.config_error {
            tracing::warn!(%err, "Configuration problem during render");
        }
        tracing::info!(
            chunks = report.chunks,
            rendered = report.cache.rendered,
            reused = report.cache.reused,
            elapsed = ?started.elapsed(),
            "Preview updated"
        );

        self.write(&output).await
    }

    async fn write(&self, output: &PreviewOutput) -> Result<()> {
        let contents = if self.json {
            serde_json::to_string_pretty(output)?
        } else {
            output.to_html().unwrap_or_default()
        };

        match &self.output {
            Some(path) => write_atomically(path, &contents).await,
            None => {
                println!("{contents}");
                Ok(())
            }
        }
    }
}

/// Write through a sibling temp file so a reader never sees a half-written preview.
async fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn run(args: Args, config: PreviewConfig) -> Result<()> {
    let template = args.template.clone().or_else(|| config.template.clone());
    let watch_config = config.watch.clone();

    let mut previewer = Previewer::load(config, TemplateRegistry::with_builtins());
    if !previewer.ready().await {
        return Err(anyhow!("preview collaborators failed to load"));
    }

    let mut session = Session {
        previewer,
        file: args.file,
        output: args.output,
        template,
        json: args.json,
    };

    session.render().await?;

    if args.once {
        return Ok(());
    }

    let watcher = DocumentWatcher::new(&session.file, watch_config)?;
    let mut revisions = watcher.subscribe();

    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    tracing::debug!("File watcher stopped");
                    break;
                }
                // Failed passes keep the previous preview.
                if let Err(err) = session.render().await {
                    tracing::error!(?err, "Failed to render preview");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, exiting");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_err) = PreviewConfig::load(args.config.as_deref());

    let _guard = init_logging(&args, &config)?;

    if let Some(err) = config_err {
        tracing::error!(?err, "Failed to load config, using the defaults");
    }

    run(args, config).await
}
