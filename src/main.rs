use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use slidecast::comments::{load_comments, Comment};
use slidecast::config::{resolve_settings, Settings};
use slidecast::error_codes::{find_coded_error, CodedError, NO_PAGES};
use slidecast::font::FontFace;
use slidecast::pipeline::{assemble_staged, plan_pages, render, LayoutParams, RenderRequest};

#[derive(Debug, Parser)]
#[command(name = "slidecast")]
#[command(version = env!("SLIDECAST_VERSION"))]
#[command(about = "Turn a list of comments into a narrated slideshow video")]
struct Cli {
    /// Settings file (YAML). Defaults to ./slidecast.yaml when present.
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    /// Print results and errors as JSON.
    #[arg(long = "json", global = true, default_value_t = false)]
    json: bool,
    #[arg(short = 'v', long = "verbose", global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render comments into page images and voice-overs, then assemble the video.
    Render {
        #[arg(long = "comments", conflicts_with = "subreddit")]
        comments: Option<PathBuf>,
        /// Use the first non-stickied hot post of this subreddit (needs the `online` feature).
        #[arg(long = "subreddit")]
        subreddit: Option<String>,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(long = "keep-staging", default_value_t = false)]
        keep_staging: bool,
    },
    /// Show how comments would be split into pages without rendering anything.
    Paginate {
        #[arg(long = "comments")]
        comments: PathBuf,
    },
    /// Assemble the video from a staging directory left by `render --keep-staging`.
    Assemble {
        #[arg(long = "staging")]
        staging: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print the effective settings.
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json_output = cli.json;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error, json_output),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn report_error(error: &anyhow::Error, json_output: bool) -> ExitCode {
    let coded = find_coded_error(error);
    if json_output {
        let envelope = match coded {
            Some(coded) => serde_json::to_value(coded.envelope()),
            None => Ok(json!({
                "ok": false,
                "error": { "code": "ERROR", "message": format!("{error:#}") }
            })),
        };
        match envelope.and_then(|value| serde_json::to_string_pretty(&value)) {
            Ok(text) => eprintln!("{text}"),
            Err(_) => eprintln!("Error: {error:#}"),
        }
    } else {
        eprintln!("Error: {error:#}");
    }

    if coded.is_some() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    let settings = resolve_settings(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Render {
            comments,
            subreddit,
            output,
            keep_staging,
        } => {
            let comments = read_comment_source(comments.as_deref(), subreddit.as_deref())?;
            run_render(&settings, &comments, output, keep_staging, cli.json)
        }
        Commands::Paginate { comments } => run_paginate(&settings, &comments, cli.json),
        Commands::Assemble { staging, output } => {
            let output = output.unwrap_or_else(|| settings.video.output.clone());
            let summary = assemble_staged(&settings, &staging, &output)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Wrote {} ({} page(s), {:.2}s)",
                    summary.output.display(),
                    summary.pages,
                    summary.duration_seconds
                );
            }
            Ok(())
        }
        Commands::Config => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print!("{}", serde_yaml::to_string(&settings)?);
            }
            Ok(())
        }
    }
}

fn read_comment_source(file: Option<&Path>, subreddit: Option<&str>) -> Result<Vec<Comment>> {
    match (file, subreddit) {
        (Some(path), _) => load_comments(path),
        (None, Some(subreddit)) => fetch_subreddit(subreddit),
        (None, None) => bail!("pass --comments FILE or --subreddit NAME"),
    }
}

#[cfg(feature = "online")]
fn fetch_subreddit(subreddit: &str) -> Result<Vec<Comment>> {
    slidecast::reddit::RedditClient::from_env()?.fetch_hot_thread_comments(subreddit)
}

#[cfg(not(feature = "online"))]
fn fetch_subreddit(subreddit: &str) -> Result<Vec<Comment>> {
    slidecast::reddit::validate_subreddit(subreddit)?;
    bail!("--subreddit needs slidecast built with the `online` feature")
}

fn run_render(
    settings: &Settings,
    comments: &[Comment],
    output: Option<PathBuf>,
    keep_staging: bool,
    json_output: bool,
) -> Result<()> {
    let request = RenderRequest {
        comments,
        output: output.unwrap_or_else(|| settings.video.output.clone()),
        keep_staging: keep_staging || settings.keep_staging,
    };
    let summary = render(settings, &request)?;

    if json_output {
        let report = json!({
            "ok": true,
            "comments": summary.record.comment_count,
            "pages": summary.assembly.pages,
            "clips": summary.assembly.clips,
            "duration_seconds": summary.assembly.duration_seconds,
            "output": summary.assembly.output,
            "staging_dir": summary.staging_dir,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Wrote {} ({} comment(s), {} page(s), {:.2}s)",
            summary.assembly.output.display(),
            summary.record.comment_count,
            summary.assembly.pages,
            summary.assembly.duration_seconds
        );
        if let Some(staging_dir) = &summary.staging_dir {
            println!("Staged assets kept in {}", staging_dir.display());
        }
    }
    Ok(())
}

fn run_paginate(settings: &Settings, comments_path: &Path, json_output: bool) -> Result<()> {
    let comments = load_comments(comments_path)?;
    if comments.is_empty() {
        return Err(CodedError::usage(
            NO_PAGES,
            format!("{} contains no comments", comments_path.display()),
        )
        .into());
    }

    let face = FontFace::load(
        &settings.style.font_path,
        settings.style.font_size,
        settings.style.font_sha256.as_deref(),
    )?;
    let plans = plan_pages(&comments, &face, &LayoutParams::from_settings(settings))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }
    for plan in &plans {
        let marker = if plan.silent { " (silent)" } else { "" };
        println!(
            "page {:>3}  comment {:>3}  tokens {}..{}{}",
            plan.index, plan.comment, plan.token_start, plan.token_end, marker
        );
        if !plan.text.is_empty() {
            println!("          {}", plan.text);
        }
    }
    println!("{} page(s) from {} comment(s)", plans.len(), comments.len());
    Ok(())
}
