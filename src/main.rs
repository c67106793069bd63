//! onec24 - command-line client for the 1C24 service
//!
//! Usage:
//!   onec24 send-code --phone +79991234567
//!   onec24 verify --phone +79991234567 --code 123456
//!   onec24 upload ./buh_2024.dt --config bp30
//!   onec24 quote --users 12 --months 6

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use onec24_client::api::UpdateProfileRequest;
use onec24_client::catalog::ConfigCode;
use onec24_client::format::{
    format_discount, format_file_size, format_phone, format_price, mask_phone, pluralize,
};
use onec24_client::pricing::{quote, PLANS, TRIAL_DAYS, TRIAL_MAX_USERS};
use onec24_client::upload::{ChunkSource, FileSource, UploadCoordinator, UploadEvent};
use onec24_client::validate::check_upload_candidate;
use onec24_client::{ApiClient, ClientConfig, ClientError, VerifyOutcome};

#[derive(Parser, Debug)]
#[command(name = "onec24")]
#[command(about = "1C24 hosted database client", version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a login code by SMS
    SendCode {
        #[arg(long)]
        phone: String,
    },
    /// Check the SMS code; logs in existing users
    Verify {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        code: String,
    },
    /// Finish registration of a new user
    Register {
        /// Temporary token printed by `verify`
        #[arg(long)]
        temp_token: String,
        #[arg(long)]
        inn: String,
        #[arg(long)]
        referral: Option<String>,
        /// Send organization details from the registry lookup
        #[arg(long)]
        with_lookup: bool,
    },
    /// Join an organization by invite
    AcceptInvite { invite_id: Uuid },
    /// Look up an organization by INN
    Lookup { inn: String },
    /// Show the current profile
    Me,
    /// Update profile fields
    UpdateProfile {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        patronymic: Option<String>,
    },
    /// List hosted databases
    Databases,
    /// List uploads
    Uploads,
    /// Server-side status of one upload
    Status { upload_id: String },
    /// Upload a .dt or .bak backup
    Upload {
        path: PathBuf,
        /// Configuration code, e.g. bp30
        #[arg(long)]
        config: ConfigCode,
    },
    /// Price a subscription
    Quote {
        #[arg(long, default_value = "1")]
        users: u32,
        #[arg(long, default_value = "1")]
        months: u32,
    },
    /// End the session
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onec24_client=info,onec24=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = ClientConfig::from_env();

    if let Commands::Quote { users, months } = &args.command {
        print_quote(*users, *months);
        return Ok(());
    }

    let client = ApiClient::from_config(&config).context("Failed to set up API client")?;

    match run(&client, &config, args.command).await {
        Err(e) if requires_login(&e) => {
            bail!("{}. Log in again: onec24 send-code --phone <phone>", e)
        }
        result => result,
    }
}

async fn run(client: &ApiClient, config: &ClientConfig, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::SendCode { phone } => {
            let sent = client.send_code(&phone).await?;
            println!(
                "Code sent to {} (valid {} s){}",
                mask_phone(&phone),
                sent.ttl,
                if sent.is_new_user { ", new user" } else { "" }
            );
        }
        Commands::Verify { phone, code } => match client.verify_code(&phone, &code).await? {
            VerifyOutcome::LoggedIn => println!("Logged in as {}", format_phone(&phone)),
            VerifyOutcome::NeedsRegistration { temp_token } => {
                println!("New user. Complete registration with:");
                println!("  onec24 register --temp-token {} --inn <INN>", temp_token);
            }
            VerifyOutcome::InvalidCode => bail!("Invalid or expired code"),
        },
        Commands::Register {
            temp_token,
            inn,
            referral,
            with_lookup,
        } => {
            let org_data = if with_lookup {
                match client.lookup_inn(&inn).await? {
                    Some(org) => Some(org.to_org_data()),
                    None => bail!("Organization with INN {} not found", inn),
                }
            } else {
                None
            };
            let registered = client
                .complete_registration(&temp_token, &inn, referral.as_deref(), org_data)
                .await?;
            match registered.organization {
                Some(org) => println!("Registered, organization {}", org.name_short),
                None => println!("Registered"),
            }
        }
        Commands::AcceptInvite { invite_id } => {
            let response = client.accept_invite(invite_id).await?;
            println!("{}", response.message);
        }
        Commands::Lookup { inn } => match client.lookup_inn(&inn).await? {
            Some(org) => {
                println!("{} ({})", org.name_short, org.org_type);
                if let Some(full) = &org.name_full {
                    println!("  {}", full);
                }
                println!("  INN {}  KPP {}", org.inn, org.kpp.as_deref().unwrap_or("-"));
                if let Some(address) = &org.address {
                    println!("  {}", address);
                }
                if !org.is_active() {
                    println!("  status: {}", org.status);
                }
            }
            None => println!("Organization not found"),
        },
        Commands::Me => {
            let me = client.me().await?;
            println!("{} {}", me.display_name, format_phone(&me.phone));
            println!("  {} (INN {})", me.organization.name_short, me.organization.inn);
            println!("  role: {}, status: {}", me.role, me.status);
            if let Some(ends) = me.trial_ends_at {
                println!("  trial ends {}", ends.format("%d.%m.%Y"));
            }
        }
        Commands::UpdateProfile {
            email,
            first_name,
            last_name,
            patronymic,
        } => {
            let update = UpdateProfileRequest {
                email,
                first_name,
                last_name,
                patronymic,
            };
            let response = client.update_profile(&update).await?;
            println!("{}", response.message);
        }
        Commands::Databases => {
            let databases = client.databases().await?;
            if databases.is_empty() {
                println!("No databases yet");
            }
            for db in databases {
                let size = db
                    .size_gb
                    .map(|gb| format_file_size((gb * 1024.0 * 1024.0 * 1024.0) as u64))
                    .unwrap_or_default();
                println!("{:<24} {:<10} {:?} {}", db.db_name, db.config_code, db.status, size);
                if let Some(url) = db.web_url.as_deref().filter(|_| db.is_reachable()) {
                    println!("  {}", url);
                }
            }
        }
        Commands::Uploads => {
            for upload in client.uploads().await? {
                println!(
                    "{} {:<30} {:?} {}/{}",
                    upload.upload_id,
                    upload.filename,
                    upload.status,
                    upload.chunks_received,
                    upload.chunks_expected
                );
            }
        }
        Commands::Status { upload_id } => {
            let coordinator = UploadCoordinator::new(client.clone());
            let status = coordinator.upload_status(&upload_id).await?;
            println!(
                "{:?}: {}/{} chunks",
                status.status, status.chunks_received, status.chunks_expected
            );
        }
        Commands::Upload { path, config: config_code } => {
            upload(client, config.upload.max_bytes, path, config_code).await?;
        }
        Commands::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Commands::Quote { .. } => {}
    }

    Ok(())
}

async fn upload(
    client: &ApiClient,
    max_bytes: u64,
    path: PathBuf,
    config: ConfigCode,
) -> anyhow::Result<()> {
    let source = FileSource::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    check_upload_candidate(source.file_name(), source.size(), max_bytes)?;

    println!(
        "Uploading {} ({}) as {}",
        path.display(),
        format_file_size(source.size()),
        config.name()
    );

    let coordinator = UploadCoordinator::new(client.clone());
    let mut events = coordinator.events();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let UploadEvent::Progress(p) = event {
                eprint!(
                    "\r{:>3}%  {} / {}",
                    p.percent(),
                    format_file_size(p.bytes_sent),
                    format_file_size(p.total_bytes)
                );
            }
        }
        eprintln!();
    });

    let result = coordinator.upload(&source, config).await;
    drop(coordinator);
    printer.await.ok();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.requires_login() => bail!("{}. Log in again and restart the upload", e),
        Err(e) => return Err(e.into()),
    };
    println!("Upload complete, database {}", outcome.db_name);
    Ok(())
}

fn print_quote(users: u32, months: u32) {
    let q = quote(users, months);
    let plan = PLANS.iter().find(|p| p.id == q.plan).unwrap_or(&PLANS[0]);

    println!(
        "Plan {}: {} {}, {} {}",
        plan.name,
        q.users,
        pluralize(i64::from(q.users), ["пользователь", "пользователя", "пользователей"]),
        q.months,
        pluralize(i64::from(q.months), ["месяц", "месяца", "месяцев"])
    );
    if q.discount_percent > 0 {
        println!("Discount {}", format_discount(q.discount_percent));
    }
    println!("Per user:  {}", format_price(q.price_per_user, true));
    println!("Monthly:   {}", format_price(q.total_monthly, true));
    println!("Total:     {}", format_price(q.total_payment, true));
    println!(
        "Free trial: {} {}, up to {} users",
        TRIAL_DAYS,
        pluralize(i64::from(TRIAL_DAYS), ["день", "дня", "дней"]),
        TRIAL_MAX_USERS
    );
}

/// Whether the command failed because the session is gone
fn requires_login(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<ClientError>().is_some_and(ClientError::requires_login))
}
