use anyhow::{anyhow, Context, Result};
use clap::Args;
use tsync_db::PgStore;
use tsync_engine::{SyncStore, WatermarkBook};
use tsync_schemas::{ResourceKind, Scope, Watermark};

use super::opt_dt;
use crate::WatermarkCmd;

/// Which watermark an operator command addresses.
#[derive(Args)]
pub struct Target {
    #[arg(long)]
    platform: String,

    /// Job name, e.g. `events` or `registrations`
    #[arg(long)]
    kind: String,

    /// Enrolment instance id (per-instance jobs only)
    #[arg(long)]
    instance: Option<i64>,
}

impl Target {
    fn resolve(&self) -> Result<(ResourceKind, Scope)> {
        let kind = ResourceKind::parse(&self.kind)
            .ok_or_else(|| anyhow!("unknown job kind '{}'", self.kind))?;
        let scope = match (kind.is_per_instance(), self.instance) {
            (true, Some(id)) if id > 0 => Scope::Instance(id),
            (true, _) => return Err(anyhow!("{kind} needs --instance <id>")),
            (false, None) => Scope::Global,
            (false, Some(_)) => return Err(anyhow!("{kind} is not per-instance; drop --instance")),
        };
        Ok((kind, scope))
    }
}

pub async fn run(cmd: WatermarkCmd) -> Result<()> {
    let store = PgStore::new(tsync_db::connect_from_env().await?);
    let book = WatermarkBook::new(&store);

    match cmd {
        WatermarkCmd::List { platform } => {
            let wms = store.list_watermarks(&platform).await?;
            if wms.is_empty() {
                println!("no watermarks for platform {platform}");
            }
            for wm in &wms {
                print_watermark(wm);
            }
        }
        WatermarkCmd::Reset { target } => {
            let mut wm = load(&book, &target).await?;
            book.reset(&mut wm).await.context("watermark reset failed")?;
            println!("reset=true");
            print_watermark(&wm);
        }
        WatermarkCmd::Enable { target } => {
            let mut wm = load(&book, &target).await?;
            book.enable(&mut wm).await.context("watermark enable failed")?;
            println!("enabled=true");
            print_watermark(&wm);
        }
        WatermarkCmd::Disable { target } => {
            let mut wm = load(&book, &target).await?;
            book.disable(&mut wm).await.context("watermark disable failed")?;
            println!("disabled=true");
            print_watermark(&wm);
        }
    }
    Ok(())
}

async fn load(book: &WatermarkBook<'_>, target: &Target) -> Result<Watermark> {
    let (kind, scope) = target.resolve()?;
    book.get(&target.platform, kind, scope)
        .await
        .with_context(|| format!("watermark load failed for {kind} {scope}"))
}

fn print_watermark(wm: &Watermark) {
    println!(
        "kind={} scope={} cursor={}#{} next_attempt={} window_end={} errors={} disabled={} last_error={}",
        wm.kind,
        wm.scope,
        wm.cursor.last_modified.to_rfc3339(),
        wm.cursor.last_id,
        wm.next_attempt_not_before.to_rfc3339(),
        opt_dt(&wm.attempt_window_end),
        wm.error_count,
        wm.disabled,
        wm.last_error.as_deref().unwrap_or("null")
    );
}
