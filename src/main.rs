use clap::{Parser, Subcommand};
use confine::compiler::Compiler;
use confine::config::{self, Config};
use confine::conventions;
use confine::output;
use confine::site::Site;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "confine")]
#[command(about = "Static site compiler")]
#[command(long_about = "\
Static site compiler

A site is a directory with three source trees. Contents are routed by file
name, rendered through the renderers their extensions name, and wrapped in a
layout. Assets matching an entry-point pattern are handed to the bundler.

Site structure:

  site/
  ├── site.toml                  # Optional config (see 'confine gen-config')
  ├── assets/
  │   ├── app.js                 # Entry point → bundled into the output assets dir
  │   └── lib/util.js            # Imported by app.js; tracked, not an entry point
  ├── layouts/
  │   └── default.html.erb       # Used when a content names no layout
  └── contents/
      ├── index.html.erb         # → /
      ├── about.html.md          # → /about.html
      └── blog/
          └── index.html.md.erb  # → /blog/  (erb, then markdown)

Frontmatter 'layout: other.html.erb' picks a layout; 'layout: false' opts out.
The environment name comes from CONFINE_ENV (default: development).")]
#[command(version)]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bundle assets and render every route into the output root
    Build,
    /// Apply the site rules and list routes without writing anything
    Check,
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build => {
            let mut site = load_site(&cli.root)?;
            let root = site.config().root().to_path_buf();
            println!("==> Building {} ({})", root.display(), site.config().env());
            let report = Compiler::new().compile_everything(&mut site)?;
            output::print_compile_report(&report, &root);
            println!("==> Build complete: {}", report.output_root.display());
        }
        Command::Check => {
            let site = load_site(&cli.root)?;
            println!("==> Checking {}", site.config().root().display());
            output::print_route_table(&site);
            println!("==> Site rules are valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config under `root` and apply the directory conventions.
fn load_site(root: &Path) -> Result<Site, Box<dyn std::error::Error>> {
    let config = Config::load(root)?;
    let mut site = Site::new(config.clone());
    site.rules(|rules| conventions::apply(rules, &config))?;
    Ok(site)
}

/// Install a stderr subscriber. `RUST_LOG` directives are honoured on top
/// of the level chosen by `-v`.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
