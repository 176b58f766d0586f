//! serpguard CLI
//!
//! CLI tool for compiling rulesets, querying decisions and creating toggle
//! patches.

mod store;

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use sg_compiler::{InteractiveRuleset, Ruleset};
use sg_core::{init_public_suffix_list, EntryProps};

#[derive(Parser)]
#[command(name = "sg-cli")]
#[command(about = "serpguard ruleset compiler and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Public suffix list (public_suffix_list.dat) used to widen patches
    #[arg(long, global = true)]
    psl: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile rule text into a serialized ruleset
    Compile {
        /// Rule text file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show ruleset info
    Info {
        /// Rule text or serialized ruleset
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Decide one search result
    Query {
        #[command(flatten)]
        rulesets: RulesetArgs,

        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Propose (and optionally apply) the patch toggling one search result
    Patch {
        #[command(flatten)]
        rulesets: RulesetArgs,

        #[command(flatten)]
        entry: EntryArgs,

        /// Suggest a rule for the whole registrable domain
        #[arg(long)]
        whole_site: bool,

        /// Replacement for the suggested rules
        #[arg(long)]
        rules_to_add: Option<String>,

        /// Apply the patch and write the updated user ruleset
        #[arg(long)]
        apply: bool,

        /// Where to write the updated user ruleset (defaults to --user)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RulesetArgs {
    /// User ruleset
    #[arg(short, long)]
    user: Option<PathBuf>,

    /// Subscription rulesets
    #[arg(short, long)]
    subscription: Vec<PathBuf>,
}

#[derive(Args)]
struct EntryArgs {
    /// Result URL
    #[arg(long)]
    url: String,

    /// Result title
    #[arg(long)]
    title: Option<String>,

    /// Extra property as key=value
    #[arg(long, value_parser = parse_prop)]
    prop: Vec<(String, String)>,
}

impl EntryArgs {
    fn props(&self) -> EntryProps {
        let mut props = EntryProps::new(self.url.as_str());
        if let Some(title) = &self.title {
            props.insert(EntryProps::TITLE, title.as_str());
        }
        for (key, value) in &self.prop {
            props.insert(key.as_str(), value.as_str());
        }
        props
    }
}

fn parse_prop(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = load_psl(cli.psl.as_deref()).and_then(|()| match cli.command {
        Commands::Compile { input, output } => cmd_compile(&input, output.as_deref()),
        Commands::Info { input } => cmd_info(&input),
        Commands::Query { rulesets, entry } => cmd_query(&rulesets, &entry),
        Commands::Patch {
            rulesets,
            entry,
            whole_site,
            rules_to_add,
            apply,
            output,
        } => cmd_patch(&rulesets, &entry, whole_site, rules_to_add.as_deref(), apply, output.as_deref()),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_psl(path: Option<&Path>) -> Result<(), String> {
    let Some(path) = path else {
        return Ok(());
    };
    let text = store::read_text(path)?;
    init_public_suffix_list(&text).map_err(|e| e.to_string())
}

fn load_engine(args: &RulesetArgs) -> Result<InteractiveRuleset, String> {
    let user = match &args.user {
        Some(path) if path.exists() => store::load_ruleset(path)?,
        _ => Ruleset::default(),
    };
    let subscriptions = args
        .subscription
        .iter()
        .map(|path| store::load_ruleset(path).map(Rc::new))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InteractiveRuleset::new(user, subscriptions))
}

fn cmd_compile(input: &Path, output: Option<&Path>) -> Result<(), String> {
    let start = Instant::now();
    let text = store::read_text(input)?;
    let ruleset = Ruleset::new(&text);
    let json = ruleset.to_json().map_err(|e| e.to_string())?;

    match output {
        Some(output) => {
            store::write_text(output, &json)?;
            println!("Compiled '{}' to '{}'", input.display(), output.display());
            println!("  Lines:    {}", ruleset.line_count());
            println!("  Rules:    {}", ruleset.index().rule_count());
            println!("  Size:     {} bytes ({:.1} KB)", json.len(), json.len() as f64 / 1024.0);
            println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_info(input: &Path) -> Result<(), String> {
    let ruleset = store::load_ruleset(input)?;
    let index = ruleset.index();

    println!("Ruleset: {}", input.display());
    if let Some(name) = ruleset.name() {
        println!("  Name:        {}", name);
    }
    println!("  Lines:       {} ({} live)", ruleset.line_count(), ruleset.lines().count());
    println!("  Rules:       {}", index.rule_count());
    println!("  Patterns:    {}", index.patterns().len());
    if !ruleset.metadata().is_empty() {
        println!();
        println!("Metadata:");
        for (key, value) in ruleset.metadata() {
            println!("  {}: {}", key, value);
        }
    }
    Ok(())
}

fn cmd_query(rulesets: &RulesetArgs, entry: &EntryArgs) -> Result<(), String> {
    let engine = load_engine(rulesets)?;
    let props = entry.props();

    for m in engine.user().query(&props) {
        let line = engine.user().get(m.line_number).unwrap_or_default();
        println!("  user:{}  {}  ({})", m.line_number, line, m.decision());
    }
    for (i, subscription) in engine.subscriptions().iter().enumerate() {
        let label = subscription.name().map_or_else(|| format!("sub{i}"), str::to_string);
        for m in subscription.query(&props) {
            let line = subscription.get(m.line_number).unwrap_or_default();
            println!("  {}:{}  {}  ({})", label, m.line_number, line, m.decision());
        }
    }

    match engine.query(&props) {
        Some(decision) => println!("{}: {}", props.url(), decision),
        None => println!("{}: none", props.url()),
    }
    Ok(())
}

fn cmd_patch(
    rulesets: &RulesetArgs,
    entry: &EntryArgs,
    whole_site: bool,
    rules_to_add: Option<&str>,
    apply: bool,
    output: Option<&Path>,
) -> Result<(), String> {
    let mut engine = load_engine(rulesets)?;
    let props = entry.props();

    let mut patch = engine.create_patch(&props, whole_site);
    if let Some(rules_to_add) = rules_to_add {
        match engine.modify_patch(rules_to_add).map_err(|e| e.to_string())? {
            Some(modified) => patch = modified,
            None => return Err(format!("'{rules_to_add}' does not change the decision for {}", props.url())),
        }
    }

    println!("{}", serde_json::to_string_pretty(&patch).map_err(|e| e.to_string())?);

    if !apply {
        return Ok(());
    }
    let target = output
        .or(rulesets.user.as_deref())
        .ok_or_else(|| "--apply needs --user or --output".to_string())?;
    engine.apply_patch().map_err(|e| e.to_string())?;
    store::write_text(target, &engine.user().to_string())?;
    println!("Wrote '{}'", target.display());
    Ok(())
}
