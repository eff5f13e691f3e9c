//! `tcc` - CLI for timecapsule
//!
//! This binary provides the command-line interface for creating capsules,
//! contributing clips and running the unseal sweep.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use timecapsule::cli::{
    AuthCommand, CapsuleCommand, ClipCommand, Cli, Command, ConfigCommand, OutputFormat,
};
use timecapsule::{
    init_logging, Backends, CapsuleService, Config, EventBus, LocalObjectStore, Result, Storage,
    SweepHandle,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("{} {:?}", e.category().code(), e);
            eprintln!("{}", e.user_message());
            eprintln!("{}", e.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config.clone())?;
    debug!("Loaded configuration: {:?}", config);

    let command = match cli.command {
        Command::Config(config_cmd) => return handle_config(&config, config_cmd),
        command => command,
    };

    let storage = Arc::new(Storage::open(config.database_path())?);
    let objects = LocalObjectStore::new(config.objects_dir())?;
    let service = CapsuleService::new(
        Backends::from_storage(storage.clone(), objects),
        EventBus::new(),
        &config,
    );

    match command {
        Command::Auth(cmd) => handle_auth(&service, cmd).await,
        Command::Capsule(cmd) => handle_capsule(&service, cmd).await,
        Command::Clip(cmd) => handle_clip(&service, cmd).await,
        Command::Sweep(cmd) => handle_sweep(&service, &config, cmd.watch).await,
        Command::Status(cmd) => handle_status(&service, &storage, &config, cmd.json).await,
        Command::Config(_) => Ok(()),
    }
}

async fn handle_auth(service: &CapsuleService, cmd: AuthCommand) -> Result<()> {
    let auth = &service.backends().auth;
    match cmd {
        AuthCommand::SignUp {
            email,
            name,
            password,
        } => {
            let user = auth.sign_up(&email, &password, &name).await?;
            println!("Signed up and signed in as {} <{}>", user.display_name, user.email);
        }
        AuthCommand::SignIn { email, password } => {
            let user = auth.sign_in(&email, &password).await?;
            println!("Signed in as {} <{}>", user.display_name, user.email);
        }
        AuthCommand::SignOut => {
            auth.sign_out().await?;
            println!("Signed out.");
        }
        AuthCommand::Whoami => match auth.current_session().await? {
            Some(user) => println!("{} <{}> ({})", user.display_name, user.email, user.id),
            None => println!("Not signed in."),
        },
    }
    Ok(())
}

async fn handle_capsule(service: &CapsuleService, cmd: CapsuleCommand) -> Result<()> {
    match cmd {
        CapsuleCommand::Create { name, unlock } => {
            let capsule = service.create_capsule(&name, unlock).await?;
            println!("Created capsule \"{}\"", capsule.name);
            println!("  Id:         {}", capsule.id);
            println!("  Unlocks at: {}", capsule.unlock_at);
            println!("  Share code: {}", capsule.share_code);
        }
        CapsuleCommand::List { format } => {
            let views = service.capsules_for_current_user().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No capsules yet.");
            } else {
                println!(
                    "{:<36}  {:<24}  {:<8}  {:>5}  {}",
                    "ID", "NAME", "STATE", "CLIPS", "COUNTDOWN"
                );
                for view in views {
                    println!(
                        "{:<36}  {:<24}  {:<8}  {:>5}  {}",
                        view.capsule.id,
                        view.capsule.name,
                        view.state,
                        view.clip_count,
                        view.countdown
                    );
                }
            }
        }
        CapsuleCommand::Show { id, format } => {
            let view = service.get_capsule(&id).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{}", view.capsule.name);
                println!("{}", "=".repeat(view.capsule.name.chars().count()));
                println!("  Id:         {}", view.capsule.id);
                println!("  State:      {}", view.state);
                println!("  Unlocks at: {}", view.capsule.unlock_at);
                println!("  Countdown:  {}", view.countdown);
                println!("  Share code: {}", view.capsule.share_code);
                println!("  Clips:      {}", view.clip_count);
                println!("  Members:    {}", view.capsule.member_ids.len());
                for member in &view.capsule.member_ids {
                    let name = service
                        .backends()
                        .directory
                        .get_user(member)
                        .await?
                        .map_or_else(|| member.clone(), |u| u.display_name);
                    let marker = if *member == view.capsule.creator_id {
                        " (creator)"
                    } else {
                        ""
                    };
                    println!("    - {name}{marker}");
                }
            }
        }
        CapsuleCommand::Join { code } => {
            let capsule = service.join_by_share_code(&code).await?;
            println!("Joined \"{}\" ({})", capsule.name, capsule.id);
        }
        CapsuleCommand::Invite { id, emails } => {
            let report = service.invite(&id, &emails).await?;
            for invitee in &report.outcome.invited {
                println!("Invited:        {}", invitee.email);
            }
            for email in &report.outcome.already_members {
                println!("Already member: {email}");
            }
            for email in &report.outcome.not_found {
                println!("No account:     {email}");
            }
            for token in &report.rejected {
                println!("Not an email:   {token}");
            }
            for email in &report.failed {
                println!("Not saved:      {email}");
            }
        }
        CapsuleCommand::RemoveMember { id, user_id } => {
            if service.remove_member(&id, &user_id).await? {
                println!("Removed {user_id}.");
            } else {
                println!("{user_id} was not a member.");
            }
        }
        CapsuleCommand::Link { id } => {
            let invite = service.share(&id).await?;
            println!("{}", invite.message);
        }
    }
    Ok(())
}

async fn handle_clip(service: &CapsuleService, cmd: ClipCommand) -> Result<()> {
    match cmd {
        ClipCommand::Upload {
            capsule,
            file,
            recorded_at,
            duration_ms,
        } => {
            let clip = service
                .upload_clip(&capsule, &file, recorded_at, duration_ms)
                .await?;
            println!("Uploaded clip {}", clip.id);
            println!("  Recorded at: {}", clip.recorded_at);
        }
        ClipCommand::List { capsule, format } => {
            let items = service.playback(&capsule).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("No clips in this capsule.");
            } else {
                for (i, item) in items.iter().enumerate() {
                    println!(
                        "{:>3}. {}  {:<16}  {}",
                        i + 1,
                        item.clip.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                        item.clip.uploader_name,
                        item.url
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_sweep(service: &CapsuleService, config: &Config, watch: bool) -> Result<()> {
    let sweeper = service.sweeper(config);

    if !watch {
        let report = sweeper.sweep(timecapsule::model::now()).await?;
        println!(
            "Checked {} due capsule(s), unsealed {}, failed {}.",
            report.checked,
            report.unsealed.len(),
            report.failed.len()
        );
        for id in &report.unsealed {
            println!("  unsealed {id}");
        }
        return Ok(());
    }

    let handle = SweepHandle::new();
    let mut events = service.events().subscribe();
    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    println!(
        "Sweeping every {}s; press Ctrl-C to stop.",
        config.unseal.sweep_interval_secs
    );
    let run = sweeper.run(handle.clone());
    tokio::pin!(run);
    loop {
        tokio::select! {
            () = &mut run => break,
            Some(event) = events.recv() => {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }
    Ok(())
}

async fn handle_status(
    service: &CapsuleService,
    storage: &Storage,
    config: &Config,
    json: bool,
) -> Result<()> {
    let stats = storage.stats()?;
    let user = service.backends().auth.current_session().await?;

    if json {
        let status = serde_json::json!({
            "signed_in": user.as_ref().map(|u| &u.email),
            "database_path": config.database_path(),
            "objects_dir": config.objects_dir(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("tcc status");
        println!("----------");
        println!(
            "Signed in:     {}",
            user.map_or_else(|| "no".to_string(), |u| u.email)
        );
        println!("Database:      {}", config.database_path().display());
        println!("Objects:       {}", config.objects_dir().display());
        println!("Database size: {} bytes", stats.db_size_bytes);
        println!("Users:         {}", stats.users);
        println!(
            "Capsules:      {} ({} sealed)",
            stats.capsules, stats.sealed_capsules
        );
        println!("Clips:         {}", stats.clips);
        println!("Notifications: {} pending", stats.pending_notifications);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Objects dir:        {}", config.objects_dir().display());
                println!();
                println!("[Unseal]");
                println!(
                    "  Sweep interval:     {}s",
                    config.unseal.sweep_interval_secs
                );
                println!("  Notify on unseal:   {}", config.unseal.notify_on_unseal);
                println!("  Reminder days:      {:?}", config.unseal.reminder_days);
                println!();
                println!("[Sharing]");
                println!("  Share base URL:     {}", config.sharing.share_base_url);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
