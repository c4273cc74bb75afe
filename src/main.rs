//! `novasound-lint`: check a rule feed before it goes live.
//!
//! Reports every rule the engine would skip and, with `--path`, the
//! transition rules that would govern a given page.

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    lint::main()
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod lint {
    use std::fs;
    use std::path::PathBuf;
    use std::process::ExitCode;

    use anyhow::{Context, Result};
    use clap::Parser;
    use novasound::page_data::PageData;
    use novasound_client::page::match_target;
    use novasound_client::TransitionTable;
    use novasound_shared::{ClassIdSelector, Direction, RuleError, SoundFeeds};
    use tracing_subscriber::EnvFilter;

    #[derive(Parser, Debug)]
    #[command(name = "novasound-lint", version, about = "Validate Nova Sound FX rule feeds")]
    struct Args {
        /// Feed JSON: `{cssMappings, transitions, sounds}`
        feed: PathBuf,

        /// Page globals JSON (`novaSoundFX`) whose sound registry fills in missing urls
        #[arg(long)]
        globals: Option<PathBuf>,

        /// Print the entry and exit rule for this path (or full url)
        #[arg(long)]
        path: Option<String>,
    }

    pub fn main() -> ExitCode {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("novasound=info")),
            )
            .init();

        match run(Args::parse()) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::from(1),
            Err(e) => {
                tracing::error!(target: "novasound", "{:#}", e);
                ExitCode::from(2)
            }
        }
    }

    fn read(path: &PathBuf) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Returns `false` if any rule would be skipped.
    fn run(args: Args) -> Result<bool> {
        let mut feeds = SoundFeeds::from_json(&read(&args.feed)?)
            .with_context(|| format!("{} is not a rule feed", args.feed.display()))?;
        if let Some(globals) = &args.globals {
            let data = PageData::parse(&read(globals)?, None)
                .with_context(|| format!("{} is not a page globals object", globals.display()))?;
            for (id, url) in data.globals.sounds {
                feeds.sounds.entry(id).or_insert(url);
            }
        }

        let (resolved, mut problems) = feeds.resolve();
        for resolved in &resolved.selectors {
            if ClassIdSelector::parse(&resolved.rule.selector).is_none() {
                problems.push(RuleError::InvalidSelector {
                    rule_id: resolved.rule.id.clone(),
                    selector: resolved.rule.selector.clone(),
                });
            }
        }
        let (table, invalid_patterns) = TransitionTable::compile(&resolved.transitions);
        problems.extend(invalid_patterns);

        for problem in &problems {
            println!("skip  {}", problem);
        }
        println!(
            "{} selector rules, {} transition rules, {} sounds, {} skipped",
            feeds.css_mappings.len(),
            feeds.transitions.len(),
            feeds.sounds.len(),
            problems.len()
        );

        if let Some(path) = &args.path {
            let target = match_target(path);
            for direction in [Direction::Entry, Direction::Exit] {
                let label = match direction {
                    Direction::Entry => "entry",
                    Direction::Exit => "exit",
                };
                match table.select(direction, &target) {
                    Some(rule) => println!(
                        "{label:<5} {target}: rule {} (priority {}) plays {}",
                        rule.rule.id, rule.rule.priority, rule.sound_url
                    ),
                    None => println!("{label:<5} {target}: no rule"),
                }
            }
        }

        Ok(problems.is_empty())
    }
}
