use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use colored::Colorize;
use serde_json::json;
use strata_crypto::{verify_version, Blake3LinkCodec, CryptoError, LinkCodec};
use strata_pack::{Bundle, BundleHeader, GraphPacker, RestoredComplete};
use strata_store::{BlockStore, Chunker, MemoryBlockStore, ValueCodec};
use strata_types::{Block, Link, Version};
use strata_version::{VersionStore, VersionStoreConfig};
use tracing::debug;

use crate::cli::*;

const DEFAULT_CONFIG: &str = "strata.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let ctx = Context::new(config)?;
    match cli.command {
        Command::Inspect(args) => cmd_inspect(&ctx, args, cli.format),
        Command::Log(args) => cmd_log(&ctx, args, cli.format),
        Command::Verify(args) => cmd_verify(&ctx, args),
        Command::Config => cmd_config(&ctx),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<VersionStoreConfig> {
    match path {
        Some(path) => Ok(VersionStoreConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(VersionStoreConfig::load(Path::new(DEFAULT_CONFIG))?),
        None => Ok(VersionStoreConfig::default()),
    }
}

/// Collaborators built once from the effective settings.
struct Context {
    config: VersionStoreConfig,
    codec: Arc<dyn LinkCodec>,
    chunker: Arc<dyn Chunker>,
    values: ValueCodec,
    packer: GraphPacker,
}

impl Context {
    fn new(config: VersionStoreConfig) -> anyhow::Result<Self> {
        let codec: Arc<dyn LinkCodec> = Arc::new(Blake3LinkCodec);
        let chunker: Arc<dyn Chunker> = Arc::new(config.chunker()?);
        let values = config.value_codec()?;
        let packer = GraphPacker::new(codec.clone(), chunker.clone());
        Ok(Self {
            config,
            codec,
            chunker,
            values,
            packer,
        })
    }

    fn read_block(&self, path: &Path) -> anyhow::Result<Block> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "read bundle");
        Ok(self.codec.block(bytes))
    }

    /// Restore a complete bundle into a fresh in-memory store and open its
    /// version store read-only.
    fn open_history(&self, path: &Path) -> anyhow::Result<(VersionStore, RestoredComplete)> {
        let block = self.read_block(path)?;
        let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let restored = self.packer.restore_complete(&block, blocks.as_ref())?;
        let options = self
            .config
            .options()
            .read_only()
            .with_store_root(restored.version_store_root);
        let store = VersionStore::open(blocks, self.chunker.clone(), self.codec.clone(), options)?;
        Ok((store, restored))
    }
}

// ---- inspect ----

fn cmd_inspect(ctx: &Context, args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let block = ctx.read_block(&args.bundle)?;
    let bundle = ctx.packer.inspect(&block)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&bundle_json(&bundle, args.blocks))?);
        return Ok(());
    }

    println!(
        "{} bundle, {} blocks, {} bytes",
        bundle.mode().to_string().cyan().bold(),
        bundle.blocks.len(),
        bundle.payload_size()
    );
    match &bundle.header {
        BundleHeader::Version { root } => println!("  Root: {}", root.to_hex().yellow()),
        BundleHeader::Random => {}
        BundleHeader::Complete {
            version_store_root,
            version_roots,
        } => {
            println!("  Store root: {}", version_store_root.to_hex().yellow());
            println!("  Versions: {}", version_roots.len());
            if let Some(head) = version_roots.first() {
                println!("  Head: {}", head.to_hex().yellow());
            }
        }
        BundleHeader::Fragment(descriptor) => {
            println!("  Root: {}", descriptor.root.to_hex().yellow());
            println!(
                "  Start: {}, count {}, depth {}",
                descriptor.start, descriptor.count, descriptor.depth
            );
            let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
            let restored = ctx.packer.restore_computed(&block, blocks, ctx.values.clone())?;
            println!(
                "  Fragment: {} vertices, {} edges, {} props",
                restored.fragment.vertices.len(),
                restored.fragment.edges.len(),
                restored.fragment.props.len()
            );
        }
    }
    if args.blocks {
        for block in &bundle.blocks {
            println!("  {} {}", block.link.to_hex().dimmed(), block.bytes.len());
        }
    }
    Ok(())
}

fn bundle_json(bundle: &Bundle, with_blocks: bool) -> serde_json::Value {
    let header = match &bundle.header {
        BundleHeader::Version { root } => json!({ "root": root.to_hex() }),
        BundleHeader::Random => json!({}),
        BundleHeader::Complete {
            version_store_root,
            version_roots,
        } => json!({
            "version_store_root": version_store_root.to_hex(),
            "version_roots": version_roots.iter().map(Link::to_hex).collect::<Vec<_>>(),
        }),
        BundleHeader::Fragment(d) => json!({
            "root": d.root.to_hex(),
            "start": d.start.offset(),
            "count": d.count,
            "depth": d.depth,
        }),
    };
    let mut value = json!({
        "mode": bundle.mode().to_string(),
        "header": header,
        "block_count": bundle.blocks.len(),
        "payload_size": bundle.payload_size(),
    });
    if with_blocks {
        value["blocks"] = bundle
            .blocks
            .iter()
            .map(|b| json!({ "link": b.link.to_hex(), "size": b.bytes.len() }))
            .collect();
    }
    value
}

// ---- log ----

fn cmd_log(ctx: &Context, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (store, _) = ctx.open_history(&args.bundle)?;
    let log: Vec<Version> = store.log().into_iter().take(args.limit).collect();
    if format == OutputFormat::Json {
        let entries: Vec<_> = log.iter().map(version_json).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Store: {}", store.id().to_string().cyan());
    let current = store.current_root();
    for version in &log {
        let head = if Some(version.root) == current { " (current)".green().to_string() } else { String::new() };
        let comment = version.details.comment.as_deref().unwrap_or("");
        if args.oneline {
            println!("{}{} {}", version.root.short_hex().yellow(), head, comment);
            continue;
        }
        println!("{}{}", version.root.to_hex().yellow().bold(), head);
        if version.is_merge() {
            let parents: Vec<String> = version.parents().map(Link::short_hex).collect();
            println!("  Merge: {}", parents.join(" "));
        } else if let Some(parent) = &version.parent {
            println!("  Parent: {}", parent.short_hex());
        }
        if let Some(author) = &version.details.author {
            match &version.details.email {
                Some(email) => println!("  Author: {author} <{email}>"),
                None => println!("  Author: {author}"),
            }
        }
        println!("  Date: {}", format_timestamp(version.details.timestamp));
        if !version.details.tags.is_empty() {
            println!("  Tags: {}", version.details.tags.join(", ").blue());
        }
        if !comment.is_empty() {
            println!("\n    {comment}");
        }
        println!();
    }
    Ok(())
}

fn version_json(version: &Version) -> serde_json::Value {
    json!({
        "root": version.root.to_hex(),
        "parent": version.parent.map(|l| l.to_hex()),
        "merge_parent": version.merge_parent.map(|l| l.to_hex()),
        "comment": version.details.comment,
        "tags": version.details.tags,
        "author": version.details.author,
        "email": version.details.email,
        "timestamp": version.details.timestamp,
        "signed": version.details.signature.is_some(),
    })
}

fn format_timestamp(millis: u64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis as i64) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => millis.to_string(),
    }
}

// ---- verify ----

#[derive(Debug, Default, PartialEq, Eq)]
struct VerifyReport {
    signed: Vec<Link>,
    unsigned: Vec<Link>,
    invalid: Vec<Link>,
}

fn verify_history(store: &VersionStore, restored: &RestoredComplete) -> anyhow::Result<VerifyReport> {
    let log = store.log();
    let roots: Vec<Link> = log.iter().map(|v| v.root).collect();
    if roots != restored.version_roots {
        anyhow::bail!("bundle header lists {} versions but the store log has {}", restored.version_roots.len(), roots.len());
    }
    let mut report = VerifyReport::default();
    for version in &log {
        match verify_version(version) {
            Ok(()) => report.signed.push(version.root),
            Err(CryptoError::Unsigned) => report.unsigned.push(version.root),
            Err(e) => {
                debug!(root = %version.root.short_hex(), error = %e, "signature rejected");
                report.invalid.push(version.root);
            }
        }
    }
    Ok(report)
}

fn cmd_verify(ctx: &Context, args: VerifyArgs) -> anyhow::Result<()> {
    let (store, restored) = ctx.open_history(&args.bundle)?;
    let report = verify_history(&store, &restored)?;
    for root in &report.invalid {
        println!("  {} {}", "invalid".red().bold(), root.to_hex());
    }
    if args.require_signatures {
        for root in &report.unsigned {
            println!("  {} {}", "unsigned".red(), root.to_hex());
        }
    }
    if !report.invalid.is_empty() || (args.require_signatures && !report.unsigned.is_empty()) {
        anyhow::bail!("signature check failed for {}", args.bundle.display());
    }
    println!("{} {} versions verified", "✓".green().bold(), restored.version_roots.len());
    println!("  Signed: {}", report.signed.len().to_string().green());
    println!("  Unsigned: {}", report.unsigned.len());
    Ok(())
}

// ---- config ----

fn cmd_config(ctx: &Context) -> anyhow::Result<()> {
    print!("{}", ctx.config.to_toml_string()?);
    Ok(())
}
