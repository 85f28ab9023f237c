/// Token Dumper - Shows the tokens a mapping produces for one document
///
/// Usage: cargo run --bin dump_tokens [--json] <mapping.xml> <document>
///
/// Set RUST_LOG=mtas_parser=trace to follow objects through the compiler.

use mtas_parser::{lexer_for, MappingConfig, Token, TOKEN_DELIMITER};
use std::fs;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mtas_parser=info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn read(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn describe(token: &Token) -> String {
    let value = token
        .value
        .render()
        .map(|v| v.replace(TOKEN_DELIMITER, " | "))
        .unwrap_or_else(|| "<pending>".to_string());
    let positions = match (token.min_position(), token.max_position()) {
        (Some(first), Some(last)) if first == last => first.to_string(),
        (Some(first), Some(last)) => format!("{}-{} ({})", first, last, token.positions.len()),
        _ => "-".to_string(),
    };
    let offset = token
        .offset
        .map(|o| format!("{}..{}", o.start, o.end))
        .unwrap_or_else(|| "-".to_string());
    let parent = token.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
    format!(
        "{:>5}  {:<18} {:<40} pos={:<12} off={:<12} parent={}",
        token.id,
        token.category.to_string(),
        value,
        positions,
        offset,
        parent
    )
}

fn main() {
    init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let json = match args.iter().position(|a| a == "--json") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin dump_tokens [--json] <mapping.xml> <document>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin dump_tokens tei-mapping.xml document.xml");
        std::process::exit(1);
    }

    let config = match MappingConfig::from_xml_str(&read(&args[0])) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid mapping {}: {}", args[0], e);
            std::process::exit(1);
        }
    };
    let document = read(&args[1]);

    let tokens = match lexer_for(&config).parse_str(&document) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("Failed to parse {}: {}", args[1], e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(tokens.tokens()) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Failed to serialize tokens: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("{} tokens ({:?})", tokens.len(), config.format);
    for token in tokens.iter() {
        println!("{}", describe(token));
    }
}
