#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use tracing::{Level as TraceLevel, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

use cfgtree::{
    Config, ConfigNode, ConfigOptions, ConfigPath, Hive, JsonStore, Operation, RegistryStore,
    TypeTag, Value, XmlStore,
};

#[derive(Parser)]
#[command(name = "cfgtree")]
#[command(about = "Inspect and edit hierarchical configuration stores", long_about = None)]
#[command(group(ArgGroup::new("store").required(true).args(["json", "xml", "hive"])))]
struct Cli {
    /// JSON document
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// XML document
    #[arg(long, value_name = "FILE")]
    xml: Option<PathBuf>,

    /// Registry hive file
    #[arg(long, value_name = "FILE", requires = "root")]
    hive: Option<PathBuf>,

    /// Root key inside the hive, e.g. Software\Company\Product\1.0
    #[arg(long, value_name = "KEY", requires = "hive")]
    root: Option<String>,

    /// Write JSON without indentation
    #[arg(long)]
    compact: bool,

    /// Wrap every JSON value in its type tag
    #[arg(long)]
    explicit_types: bool,

    /// Never write back to the store
    #[arg(long)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every value in the tree
    Dump,
    /// Print one value
    Get { path: String, name: String },
    /// Write one value, given its type tag and text form
    Set {
        path: String,
        name: String,
        tag: String,
        text: String,
    },
    /// Delete a value, or the whole node when no name is given
    Delete { path: String, name: Option<String> },
}

impl Commands {
    fn is_query(&self) -> bool {
        matches!(self, Commands::Dump | Commands::Get { .. })
    }
}

fn open_config(cli: &Cli) -> Result<Config> {
    let options = ConfigOptions::default().with_read_only(cli.read_only || cli.command.is_query());
    if (cli.compact || cli.explicit_types) && cli.json.is_none() {
        warn!("--compact and --explicit-types only apply to JSON documents");
    }

    if let Some(path) = &cli.json {
        let store = JsonStore::new(path)
            .compact(cli.compact)
            .explicit_types(cli.explicit_types);
        return Config::open(store, options)
            .with_context(|| format!("failed to open JSON document {}", path.display()));
    }
    if let Some(path) = &cli.xml {
        return Config::open(XmlStore::new(path), options)
            .with_context(|| format!("failed to open XML document {}", path.display()));
    }
    if let (Some(path), Some(root)) = (&cli.hive, &cli.root) {
        let hive = Hive::open_file(path)
            .with_context(|| format!("failed to load hive {}", path.display()))?;
        return Config::open(RegistryStore::new(hive, root.as_str()), options)
            .with_context(|| format!("failed to open key {root} in {}", path.display()));
    }
    bail!("no store selected")
}

fn dump(node: &mut ConfigNode) -> Result<()> {
    let path = node.path().clone();
    for (name, value) in node.values()? {
        println!(
            "{path}\t{name}\t{}\t{}",
            value.tag(),
            value.to_text().escape_debug()
        );
    }
    let children: Vec<String> = node.node_names()?.map(str::to_string).collect();
    for name in children {
        dump(node.sub_node(&name))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = open_config(&cli)?;
    debug!(read_only = config.options().read_only, "Store opened");

    match &cli.command {
        Commands::Dump => dump(config.root())?,
        Commands::Get { path, name } => {
            let node = config.root().node_at(&ConfigPath::parse(path));
            node.load()?;
            match node.raw_value(name) {
                Some(value) => println!("{}", value.to_text()),
                None => bail!("no value '{name}' at {}", ConfigPath::parse(path)),
            }
        }
        Commands::Set { path, name, tag, text } => {
            let tag: TypeTag = tag.parse()?;
            let value = Value::from_text(tag, text)
                .with_context(|| format!("'{text}' is not a valid {tag} value"))?;
            let node = config.root().node_at(&ConfigPath::parse(path));
            node.put_value(name, value, Operation::Write)?;
            info!(path = %node.path(), name = %name, %tag, "Value set");
        }
        Commands::Delete { path, name } => {
            let path = ConfigPath::parse(path);
            match (name, path.split_last()) {
                (Some(name), _) => config.root().node_at(&path).delete_item(name)?,
                (None, None) => config.root().clear(),
                (None, Some((last, parent))) => {
                    let parent: ConfigPath = parent.iter().cloned().collect();
                    config.root().node_at(&parent).delete_sub_node(last)?;
                }
            }
            info!(path = %path, name = ?name, "Deleted");
        }
    }

    if config.options().read_only && !cli.command.is_query() {
        warn!("Read-only store, changes were not written");
    }
    config.close().context("failed to write configuration")?;
    Ok(())
}
