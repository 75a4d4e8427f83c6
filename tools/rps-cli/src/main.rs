//! RPS-CLI: Rock-Paper-Scissors Command Line Client
//!
//! Plays rounds, shows history and standings, and follows the leaderboard
//! live against a hosted store, or against an in-memory one with `--offline`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rps_client::{
    Choice, ClientSettings, GameClient, GameClientApi, GameResult, InMemoryStore,
    LeaderboardEntry, LeaderboardMode, RemoteStore, Session, StoreConfig, SupabaseStore,
    TableStoreExt, UserId, GAME_RESULTS_TABLE,
};
use rps_telemetry::{init_telemetry, TelemetryConfig};

/// RPS-CLI: Rock-Paper-Scissors Command Line Client
#[derive(Parser, Debug)]
#[command(name = "rps-cli")]
#[command(about = "Play rock-paper-scissors and follow the leaderboard")]
struct Cli {
    /// Remote store base URL
    #[arg(long, env = "SUPABASE_URL", hide_env_values = true)]
    url: Option<String>,

    /// Remote store public key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Account e-mail for commands that need a session
    #[arg(long, env = "RPS_EMAIL")]
    email: Option<String>,

    /// Account password for commands that need a session
    #[arg(long, env = "RPS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Leaderboard mode: raw or stats
    #[arg(long)]
    mode: Option<LeaderboardMode>,

    /// Use an in-memory store seeded with demo players
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Signup {
        /// Name shown on the leaderboard
        #[arg(long)]
        username: String,
    },
    /// Check credentials and show the session
    Signin,
    /// Play one or more rounds
    Play {
        /// rock, paper or scissors
        choice: Choice,
        /// Number of rounds
        #[arg(short, long, default_value = "1")]
        rounds: u32,
    },
    /// Show your ten most recent rounds
    History,
    /// Show the leaderboard
    Leaderboard,
    /// Show your statistics
    Stats,
    /// Follow the leaderboard live
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(TelemetryConfig::from_env().with_service_name("rps-cli"))
        .context("Failed to initialize logging")?;

    let mut config = StoreConfig::from_env();
    if cli.url.is_some() {
        config.url = cli.url.clone();
    }
    if cli.key.is_some() {
        config.anon_key = cli.key.clone();
    }
    if let Some(mode) = cli.mode {
        config.settings.leaderboard.mode = mode;
    }

    if cli.offline {
        info!("Running against the in-memory store");
        let store = Arc::new(InMemoryStore::with_stats_trigger());
        seed_demo_players(&store).await?;
        let client = GameClient::new(store, config.settings);
        return run(&client, &cli).await;
    }

    config.validate().context("Invalid configuration")?;
    let store = SupabaseStore::from_config(&config).context("Remote store not configured")?;
    let client = GameClient::new(Arc::new(store), config.settings);
    if !client.check_connection().await {
        warn!("Remote store did not answer the connection check");
    }
    run(&client, &cli).await
}

async fn run<S: RemoteStore + 'static>(client: &GameClient<S>, cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Signup { username } => {
            let (email, password) = credentials(cli)?;
            let session = client.sign_up(email, password, username).await?;
            print_session(&session);
        }
        Command::Signin => {
            let session = sign_in(client, cli).await?;
            print_session(&session);
        }
        Command::Play { choice, rounds } => {
            sign_in(client, cli).await?;
            for _ in 0..*rounds {
                let game = client.play_round(*choice).await?;
                println!(
                    "{} vs {}: {}",
                    game.player_choice, game.computer_choice, game.result
                );
            }
            print_leaderboard(&client.leaderboard());
        }
        Command::History => {
            let session = sign_in(client, cli).await?;
            let games = client.fetch_user_history(&session.user_id).await?;
            print_history(&games);
        }
        Command::Leaderboard => {
            let entries = client.fetch_leaderboard().await?;
            print_leaderboard(&entries);
        }
        Command::Stats => {
            let session = sign_in(client, cli).await?;
            match client.fetch_user_stats(&session.user_id).await? {
                Some(stats) => println!(
                    "{}: {} games, {} wins, {} losses, {} draws, {:.1}% won",
                    stats.username,
                    stats.total_games,
                    stats.wins,
                    stats.losses,
                    stats.draws,
                    stats.win_rate.unwrap_or(0.0)
                ),
                None => println!("No games recorded yet"),
            }
        }
        Command::Watch { seconds } => {
            sign_in(client, cli).await?;
            watch(client, *seconds).await?;
        }
    }
    Ok(())
}

fn credentials(cli: &Cli) -> Result<(&str, &str)> {
    match (cli.email.as_deref(), cli.password.as_deref()) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => bail!("--email and --password (or RPS_EMAIL / RPS_PASSWORD) are required"),
    }
}

/// Open a session. Offline, an unknown account is created on the fly.
async fn sign_in<S: RemoteStore + 'static>(client: &GameClient<S>, cli: &Cli) -> Result<Session> {
    let (email, password) = credentials(cli)?;
    match client.sign_in(email, password).await {
        Ok(session) => Ok(session),
        Err(e) if cli.offline => {
            info!(error = %e, "Creating offline account");
            let username = email.split('@').next().unwrap_or(email);
            Ok(client.sign_up(email, password, username).await?)
        }
        Err(e) => Err(e).context("Sign-in failed"),
    }
}

async fn watch<S: RemoteStore + 'static>(client: &GameClient<S>, seconds: Option<u64>) -> Result<()> {
    if !client.start_live_updates().await? {
        warn!("Push channel unavailable, relying on periodic refresh");
    }
    print_leaderboard(&client.fetch_leaderboard().await?);

    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut seen = client.refresh_count();
    loop {
        tokio::select! {
            _ = &mut interrupted => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                let count = client.refresh_count();
                if count != seen {
                    seen = count;
                    print_leaderboard(&client.leaderboard());
                }
            }
        }
    }

    client.stop_live_updates().await;
    Ok(())
}

/// Demo opponents so the offline leaderboard is not empty.
async fn seed_demo_players(store: &InMemoryStore) -> Result<()> {
    let players = [
        ("ada", [Choice::Rock, Choice::Paper, Choice::Paper]),
        ("linus", [Choice::Scissors, Choice::Scissors, Choice::Rock]),
        ("grace", [Choice::Paper, Choice::Rock, Choice::Scissors]),
    ];
    for (name, moves) in players {
        let user_id = store.register(&format!("{name}@demo.local"), "demo-password", name)?;
        for player in moves {
            let computer = rps_client::random_computer_choice();
            let result = rps_client::resolve_outcome(player, computer);
            let game = GameResult::new(UserId::clone(&user_id), name, player, computer, result);
            store
                .insert_one::<_, GameResult>(GAME_RESULTS_TABLE, &game)
                .await?;
        }
    }
    Ok(())
}

fn print_session(session: &Session) {
    println!("Signed in as {} ({})", session.username, session.user_id);
}

fn print_history(games: &[GameResult]) {
    if games.is_empty() {
        println!("No rounds yet");
        return;
    }
    for game in games {
        println!(
            "{}  {:<8} vs {:<8} {}",
            game.played_at.format("%Y-%m-%d %H:%M:%S"),
            game.player_choice,
            game.computer_choice,
            game.result
        );
    }
}

fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("Leaderboard is empty");
        return;
    }
    println!("{:>3}  {:<16} {:>5} {:>6} {:>7}", "#", "player", "wins", "games", "win %");
    for (rank, entry) in entries.iter().enumerate() {
        println!(
            "{:>3}  {:<16} {:>5} {:>6} {:>7}",
            rank + 1,
            entry.username,
            entry.wins,
            entry.total,
            entry.win_rate
        );
    }
}
