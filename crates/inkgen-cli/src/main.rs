use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use inkgen_contracts::accounts::{Identity, CREDIT_RESET_NOTICE, PLAN_OFFERS};
use inkgen_contracts::prompt::{
    find_preset, suggest_idea, IdeaForm, IdeaMode, Intensity, TattooStyle, PRESETS,
};
use inkgen_engine::config::StudioConfig;
use inkgen_engine::workflow::{GenerationOutcome, Rejection};
use inkgen_engine::Studio;

#[derive(Debug, Parser)]
#[command(name = "inkgen", version, about = "Tattoo extension studio")]
struct Cli {
    /// Local account store and identity session.
    #[arg(long, global = true, default_value = ".inkgen")]
    store: PathBuf,
    /// Output directory for generated images.
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(long, global = true)]
    image_model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Login(LoginArgs),
    Logout,
    Account,
    Presets,
    Ideas,
    Plans,
    Generate(GenerateArgs),
    History(HistoryArgs),
}

#[derive(Debug, Args)]
struct LoginArgs {
    #[arg(long)]
    uid: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    /// One JSON record per line.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Photo of the existing tattoo (JPG or PNG).
    #[arg(long)]
    image: PathBuf,
    /// Free-text idea.
    #[arg(long, conflicts_with = "preset")]
    idea: Option<String>,
    /// Preset id, see `inkgen presets`.
    #[arg(long)]
    preset: Option<String>,
    #[arg(long, default_value = "black-and-grey", value_parser = parse_style)]
    style: TattooStyle,
    #[arg(long, default_value = "balanced", value_parser = parse_intensity)]
    intensity: Intensity,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("inkgen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = studio_config(&cli);
    match cli.command {
        Command::Login(args) => run_login(config, args),
        Command::Logout => {
            Studio::open(config)?.sign_out()?;
            println!("Signed out.");
            Ok(0)
        }
        Command::Account => run_account(config),
        Command::Presets => {
            for preset in PRESETS {
                println!("{:<14} {}", preset.id, preset.title);
            }
            Ok(0)
        }
        Command::Ideas => {
            println!("{}", suggest_idea(&mut rand::thread_rng()));
            Ok(0)
        }
        Command::Plans => {
            print_plans();
            Ok(0)
        }
        Command::Generate(args) => run_generate(config, args),
        Command::History(args) => run_history(config, args),
    }
}

fn studio_config(cli: &Cli) -> StudioConfig {
    let mut config = StudioConfig::from_env(&cli.store).with_image_model(cli.image_model.clone());
    if let Some(out) = &cli.out {
        config = config.with_out_dir(out);
    }
    if let Some(events) = &cli.events {
        config = config.with_events_path(events);
    }
    config
}

fn run_login(config: StudioConfig, args: LoginArgs) -> Result<i32> {
    let mut studio = Studio::open(config)?;
    let identity = Identity {
        uid: args.uid,
        email: args.email,
        display_name: args.name,
        avatar: args.avatar,
    };
    let account = studio.sign_in(identity)?;
    println!(
        "Signed in as {} ({} plan, {} credits left)",
        account.name.as_deref().unwrap_or(&account.uid),
        account.plan.as_str(),
        account.credits
    );
    Ok(0)
}

fn run_account(config: StudioConfig) -> Result<i32> {
    let studio = Studio::open(config)?;
    let Some(account) = studio.account() else {
        println!("{}", Rejection::NotSignedIn);
        return Ok(2);
    };
    println!("uid:     {}", account.uid);
    if let Some(email) = &account.email {
        println!("email:   {email}");
    }
    println!("plan:    {}", account.plan.as_str());
    println!("credits: {}", account.credits);
    println!("{CREDIT_RESET_NOTICE}");
    Ok(0)
}

fn run_generate(config: StudioConfig, args: GenerateArgs) -> Result<i32> {
    let form = idea_form(&args)?;
    let mut studio = Studio::open(config)?;
    if let Some(reason) = studio.fallback_reason() {
        eprintln!("note: {reason} Using {}.", studio.model());
    }

    if let Err(err) = studio.select_image(&args.image)? {
        println!("{err}");
        return Ok(2);
    }
    studio.set_form(form);

    match studio.generate()? {
        GenerationOutcome::Completed(report) => {
            println!("Prompt: {}", report.prompt);
            for result in &report.results {
                println!("{}  {}", result.id, result.image_ref);
            }
            println!("Credits left: {}", report.credits_remaining);
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            Ok(0)
        }
        GenerationOutcome::Rejected(rejection) => {
            println!("{rejection}");
            if !rejection.offers().is_empty() {
                print_plans();
            }
            Ok(2)
        }
        GenerationOutcome::Failed { message } => {
            println!("{message}");
            Ok(2)
        }
    }
}

fn run_history(config: StudioConfig, args: HistoryArgs) -> Result<i32> {
    let studio = Studio::open(config)?;
    if studio.account().is_none() {
        println!("{}", Rejection::NotSignedIn);
        return Ok(2);
    }
    let records = studio.history()?;
    if args.json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(0);
    }
    if records.is_empty() {
        println!("No generations yet.");
    }
    for record in records {
        println!("{}  {}", record.created_at, record.prompt);
        for image_ref in &record.image_refs {
            println!("    {image_ref}");
        }
    }
    Ok(0)
}

fn print_plans() {
    for offer in PLAN_OFFERS {
        println!("{}", offer.headline());
        for feature in offer.features {
            println!("  - {feature}");
        }
    }
    println!("{CREDIT_RESET_NOTICE}");
}

fn idea_form(args: &GenerateArgs) -> Result<IdeaForm> {
    let mode = match (&args.idea, &args.preset) {
        (Some(idea), _) => IdeaMode::Custom(idea.clone()),
        (None, Some(id)) => {
            if find_preset(id).is_none() {
                bail!("unknown preset '{id}' (see `inkgen presets`)");
            }
            IdeaMode::Preset(id.clone())
        }
        (None, None) => IdeaMode::Random,
    };
    Ok(IdeaForm {
        mode,
        style: args.style,
        intensity: args.intensity,
    })
}

fn parse_style(raw: &str) -> Result<TattooStyle, String> {
    TattooStyle::parse(raw).ok_or_else(|| format!("unknown style '{raw}'"))
}

fn parse_intensity(raw: &str) -> Result<Intensity, String> {
    Intensity::parse(raw).ok_or_else(|| format!("unknown intensity '{raw}'"))
}
