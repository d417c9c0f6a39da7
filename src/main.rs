use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_lsp::{LspService, Server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use varlens_lsp::backend::{METHOD_VIEWPORT, VarlensBackend};
use varlens_lsp::cache::VariableCache;
use varlens_lsp::files::LocalFiles;
use varlens_lsp::notify::NullNotifier;
use varlens_lsp::project::{FsProjectResolver, ProjectResolver};
use varlens_lsp::providers::decorations::{Decoration, DecorationKind, build_decorations};
use varlens_lsp::scanner;
use varlens_lsp::structure::parse;

#[derive(Parser)]
#[command(name = "varlens-lsp")]
#[command(about = "Language server resolving template variable placeholders", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the LSP server (default behavior)
    Lsp,
    /// Resolve all placeholders in a document and print the result
    Render {
        /// Path to the document to render
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Parse a variables file and report its sections, keys, and issues
    Check {
        /// Path to the variables file to check
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Some(Commands::Render { file }) => run_render(file).await,
        Some(Commands::Check { file }) => run_check(file).await,
        Some(Commands::Lsp) | None => {
            run_lsp().await;
            ExitCode::SUCCESS
        }
    }
}

async fn run_lsp() {
    tracing::info!("Starting varlens LSP server");

    let (service, socket) = LspService::build(VarlensBackend::new)
        .custom_method(METHOD_VIEWPORT, VarlensBackend::viewport)
        .finish();

    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;
}

async fn run_render(file: PathBuf) -> ExitCode {
    match render(&file).await {
        Ok(rendered) => {
            print!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn render(file: &PathBuf) -> anyhow::Result<String> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;

    let document = file.canonicalize().unwrap_or_else(|_| file.clone());
    let Some(project) = FsProjectResolver::default().resolve(&document) else {
        tracing::warn!("no project found for {}, nothing resolved", file.display());
        return Ok(text);
    };

    let cache = VariableCache::new(Arc::new(LocalFiles), Arc::new(NullNotifier));
    cache
        .load_variables(&project)
        .await
        .with_context(|| format!("could not load variables from {}", project.data_file.display()))?;

    let matches = scanner::find_all(&text);
    let lookup = |key: &str| cache.get(&project, key);
    let decorations = build_decorations(&matches, &text, 0, None, &lookup, false);

    Ok(apply_decorations(&text, &decorations))
}

/// Apply resolved replacement spans back to front so earlier offsets stay
/// valid. Unresolved tokens are left raw.
fn apply_decorations(text: &str, decorations: &[Decoration]) -> String {
    let mut out = text.to_string();
    for decoration in decorations.iter().rev() {
        if let DecorationKind::Resolved { text: value } = &decoration.kind {
            out.replace_range(decoration.from..decoration.to, value);
        }
    }
    out
}

async fn run_check(file: PathBuf) -> ExitCode {
    let text = match tokio::fs::read_to_string(&file).await {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", file.display());
            return ExitCode::FAILURE;
        }
    };

    let structure = parse(&text);

    for section in &structure.sections {
        println!("{}:", section.header);
        for node in &section.nodes {
            print_node(node, 1);
        }
    }

    if structure.duplicates.is_empty() {
        println!("\nNo issues found.");
        ExitCode::SUCCESS
    } else {
        for dup in &structure.duplicates {
            eprintln!(
                "warning: duplicate key '{}' on line {} (first defined on line {})",
                dup.path,
                dup.line + 1,
                dup.first_line + 1
            );
        }
        ExitCode::FAILURE
    }
}

fn print_node(node: &varlens_lsp::structure::StructureNode, depth: usize) {
    let indent = "  ".repeat(depth);
    if node.is_structural_parent {
        println!("{indent}{}:", node.key);
        for child in &node.children {
            print_node(child, depth + 1);
        }
    } else {
        println!("{indent}{} = {}", node.key, node.value.display_text());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_decorations_replaces_back_to_front() {
        let text = "{{< var a >}} and {{< var b >}}";
        let matches = scanner::find_all(text);
        let lookup = |key: &str| match key {
            "a" => Some("one".to_string()),
            "b" => Some("two".to_string()),
            _ => None,
        };
        let decorations = build_decorations(&matches, text, 0, None, &lookup, false);
        assert_eq!(apply_decorations(text, &decorations), "one and two");
    }

    #[test]
    fn test_apply_decorations_leaves_unresolved_raw() {
        let text = "keep {{< var missing >}} raw";
        let matches = scanner::find_all(text);
        let decorations = build_decorations(&matches, text, 0, None, &|_| None, false);
        assert_eq!(apply_decorations(text, &decorations), text);
    }
}
