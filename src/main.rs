use anyhow::{Context, Result};
use query_filters::validator::{Integer, Text};
use query_filters::{
    or, Filter, FilterConfig, Node, Optional, ParseOutcome, QueryParams, SqlCompiler, SqlConfig,
    ValidatorRegistry,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "filters.json";

/// Tree used when no configuration file can be loaded.
fn demo_tree() -> Result<Node> {
    let names = Optional::new([
        Node::from(Filter::new("first_name").required(true).validated_by(Text)),
        Node::from(Filter::new("last_name").required(true).validated_by(Text)),
    ])?;
    let tree = or(
        Filter::new("username").lookups_csv("exact,icontains").validated_by(Text),
        names,
    )
    .and(Filter::new("age").lookups_csv("gte,lte,range").validated_by(Integer));
    Ok(tree)
}

/// Load the tree and SQL settings, falling back to the demo tree.
fn load(path: &str) -> Result<(Node, SqlConfig)> {
    match FilterConfig::from_json_file(path) {
        Ok(config) => {
            let tree = config
                .build(&ValidatorRegistry::with_builtins())
                .with_context(|| format!("building filter tree from {}", path))?;
            info!(path, leaves = tree.leaves().len(), "loaded filter tree");
            Ok((tree, config.sql))
        }
        Err(e) => {
            warn!("{}, using the built-in demo tree", e);
            Ok((demo_tree()?, SqlConfig::default()))
        }
    }
}

fn report(outcome: &ParseOutcome, compiler: &SqlCompiler) -> Result<()> {
    if !outcome.valid() {
        println!("{}", serde_json::to_string_pretty(outcome.errors())?);
        return Ok(());
    }

    let result = compiler.compile(outcome.predicate())?;
    println!("{}", result.sql);
    for opt in &result.optimizations {
        println!("  • {:?}", opt);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let (tree, sql) = load(&path)?;
    let compiler = SqlCompiler::with_config(sql);

    let queries: Vec<String> = args.collect();
    if !queries.is_empty() {
        for query in &queries {
            report(&tree.parse(&QueryParams::parse(query)), &compiler)?;
        }
        return Ok(());
    }

    println!("Enter a query string such as `username__icontains=bo&age__gte=21` (Ctrl-D to quit).");
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("filters> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                if let Err(e) = report(&tree.parse(&QueryParams::parse(line)), &compiler) {
                    println!("error: {:#}", e);
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
