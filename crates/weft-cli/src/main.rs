use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

use anyhow::{anyhow, Context};
use clap::Parser;
use weft::{
    display::ByteSliceExt, linemap::LineMap, ClosureTable, Grammar, GrammarDef, Options,
    ParseError,
};

/// Interpret a json grammar against an input file
#[derive(Parser, Debug)]
#[command(name = "weft")]
struct Cli {
    /// grammar definition in json
    grammar: PathBuf,

    /// the file to parse
    input: PathBuf,

    /// start production, the grammar's own start production if omitted
    #[arg(long)]
    start: Option<String>,

    /// json file with interpreter options, flags take precedence
    #[arg(long)]
    options: Option<PathBuf>,

    /// memoize production results
    #[arg(long, default_value_t = false)]
    memo: bool,

    /// characters skipped before every terminal
    #[arg(long)]
    spacing: Option<String>,

    /// print the result tree, the default when --compile isn't given
    #[arg(long, default_value_t = false)]
    tree: bool,

    /// run the builtin actions over the result tree and print the accumulator as json
    #[arg(long, default_value_t = false)]
    compile: bool,
}

struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        use std::io::Write as _;
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| std::fmt::Error)
    }
}

fn main() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| log::LevelFilter::from_str(&level).ok())
        .unwrap_or(log::LevelFilter::Warn);

    _ = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    );

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read `{}`", path.display()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let def: GrammarDef = serde_json::from_slice(&read(&cli.grammar)?)
        .with_context(|| format!("Malformed grammar `{}`", cli.grammar.display()))?;
    let grammar = Grammar::new(def)
        .with_context(|| format!("Invalid grammar `{}`", cli.grammar.display()))?;

    let mut options: Options = match &cli.options {
        Some(path) => serde_json::from_slice(&read(path)?)
            .with_context(|| format!("Malformed options `{}`", path.display()))?,
        None => Options::default(),
    };
    if cli.memo {
        options.memoize = true;
    }
    if let Some(spacing) = cli.spacing {
        options.spacing = spacing;
    }

    let start = match &cli.start {
        Some(name) => grammar
            .lookup(name)
            .with_context(|| format!("Unknown production `{name}`"))?,
        None => grammar.start(),
    };

    let input = read(&cli.input)?;

    let time = Instant::now();
    let tree = weft::interpret(&grammar, start, &input, &options).map_err(|e| match e {
        ParseError::Incomplete { line, column, .. } => {
            let linemap = LineMap::new(&input);
            let snippet = linemap.line_bytes(&input, line - 1);
            anyhow!(
                "{}:{line}:{column} {e}\n  {}",
                cli.input.display(),
                snippet.display()
            )
        }
        e => e.into(),
    })?;
    log::info!("Interpreted `{}` in {:.2?}", cli.input.display(), time.elapsed());

    if cli.tree || !cli.compile {
        tree.display_into(&mut StdoutSink)?;
    }

    if cli.compile {
        let mut runner = ClosureTable::with_builtins();
        let compiled = grammar.compile(&tree, &mut runner)?;
        let json = serde_json::json!({
            "value": compiled.value,
            "ltr": String::from_utf8_lossy(&compiled.ltr),
            "stack": compiled.stack,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    Ok(())
}
