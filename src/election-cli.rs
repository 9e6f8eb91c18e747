//! A small command-line front end for the election backend.
//! Sessions are kept in the configured session file, so a login survives between
//! invocations and the access token is refreshed as needed.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;

use election_client::{
    lifecycle::Phase,
    logging,
    model::{auth::Credentials, Election, ElectionResult, Selection, VoterAccess},
    Client, Config, Result,
};

const PROGRAM_NAME: &str = "election-cli";

const ABOUT_TEXT: &str = "Create, inspect and vote in elections.

EXIT CODES:
     0: Success.
     1: Error.";

const ELECTION_ID: &str = "ELECTION_ID";
const OPTION_IDS: &str = "OPTION_IDS";
const VOTER_ID: &str = "voter-id";
const EMAIL: &str = "EMAIL";
const PASSWORD: &str = "PASSWORD";
const QUIET: &str = "quiet";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    let election_id = || {
        Arg::new(ELECTION_ID)
            .help("Identifier of the election")
            .action(ArgAction::Set)
            .required(true)
    };

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .arg(
            Arg::new(QUIET)
                .long(QUIET)
                .short('q')
                .help("Do not log individual HTTP requests")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("login")
                .about("Log in and keep the session")
                .arg(Arg::new(EMAIL).action(ArgAction::Set).required(true))
                .arg(Arg::new(PASSWORD).action(ArgAction::Set).required(true)),
        )
        .subcommand(Command::new("logout").about("Forget the stored session"))
        .subcommand(Command::new("elections").about("List your elections"))
        .subcommand(
            Command::new("show")
                .about("Show one of your elections")
                .arg(election_id()),
        )
        .subcommand(
            Command::new("results")
                .about("Show election results; open elections need no login")
                .arg(election_id())
                .arg(
                    Arg::new("open")
                        .long("open")
                        .help("Fetch the public results of an open election")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("vote")
                .about("Cast a vote, by voter link or in an open election")
                .arg(election_id())
                .arg(
                    Arg::new(OPTION_IDS)
                        .help("Option(s) to vote for")
                        .action(ArgAction::Append)
                        .required(true),
                )
                .arg(
                    Arg::new(VOTER_ID)
                        .long(VOTER_ID)
                        .help("Secret from a personal voting link; omit for open elections")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(Command::new("health").about("Check that the backend is reachable"))
}

fn describe(election: &Election) -> String {
    let phase = match election.phase_at(Utc::now()) {
        Phase::Upcoming => "upcoming",
        Phase::Running => "running",
        Phase::Finished => "finished",
    };
    format!(
        "{} {} [{}, {}{}]",
        election.election_id,
        election.election_name,
        phase,
        election.poll_type(),
        if election.is_open { ", open" } else { "" }
    )
}

fn print_results(result: &ElectionResult) {
    println!(
        "{} vote{} from {} voter{}",
        result.total_votes,
        if result.total_votes != 1 { "s" } else { "" },
        result.total_voters,
        if result.total_voters != 1 { "s" } else { "" }
    );
    for (option, rank) in result.options.iter().zip(result.dense_ranks()) {
        println!(
            "  #{} {}: {} ({}%)",
            rank + 1,
            option.option_name,
            option.votes,
            result.share_percent(option)
        );
    }
}

/// Run the chosen subcommand.
async fn run(client: &Client, args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("login", sub)) => {
            let email: &String = sub.get_one(EMAIL).unwrap(); // Required argument is guaranteed to be present.
            let password: &String = sub.get_one(PASSWORD).unwrap(); // Ditto.
            let credentials = Credentials {
                email: email.clone(),
                password: password.clone(),
            };
            client.login(&credentials).await?;
            println!("Logged in as {}.", credentials.email);
        }
        Some(("logout", _)) => {
            client.logout()?;
            println!("Logged out.");
        }
        Some(("elections", _)) => {
            for election in client.elections().await? {
                println!("{}", describe(&election));
            }
        }
        Some(("show", sub)) => {
            let id: &String = sub.get_one(ELECTION_ID).unwrap(); // Required argument is guaranteed to be present.
            let election = client.election(id).await?;
            println!("{}", describe(&election));
            for option in &election.options {
                println!(
                    "  {}: {}",
                    option.option_id.as_deref().unwrap_or("-"),
                    option.option_name
                );
            }
        }
        Some(("results", sub)) => {
            let id: &String = sub.get_one(ELECTION_ID).unwrap(); // Required argument is guaranteed to be present.
            let result = if sub.get_flag("open") {
                client.open_election_result(id).await?
            } else {
                client.election_result(id).await?
            };
            print_results(&result);
        }
        Some(("vote", sub)) => {
            let id: &String = sub.get_one(ELECTION_ID).unwrap(); // Required argument is guaranteed to be present.
            let access = match sub.get_one::<String>(VOTER_ID) {
                Some(voter_id) => VoterAccess::VoterLink {
                    voter_id: voter_id.clone(),
                },
                None => VoterAccess::Open,
            };
            let option_ids: Vec<String> = sub
                .get_many::<String>(OPTION_IDS)
                .map(|ids| ids.cloned().collect())
                .unwrap_or_default();

            let election = client.ballot(id, &access).await?;
            let mut selection = Selection::multiple(option_ids.iter().cloned());
            if let Some(first) = option_ids.first() {
                selection.choose(first.clone());
            }
            let ack = client.cast_vote(&election, &access, &selection).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Vote cast.".to_string()));
        }
        Some(("health", _)) => {
            println!("{}", client.health().await?);
        }
        _ => unreachable!("a subcommand is required"),
    }
    Ok(())
}

fn main() {
    let args = cli().get_matches();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // Logging is optional for a CLI; carry on without it.
    if let Err(e) = logging::init(config.log_config()) {
        eprintln!("Logging disabled: {e}");
    } else if args.get_flag(QUIET) {
        logging::set_http_logging(LevelFilter::Off);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async {
        let config = if config.session_file().is_none() {
            config.with_session_file(default_session_file())
        } else {
            config
        };
        let client = match Client::new(&config) {
            Ok(client) => client,
            Err(e) => {
                eprintln!("{e}");
                return 1;
            }
        };
        let result = run(&client, &args).await;
        client.session().dispose();
        match result {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{e}");
                1
            }
        }
    });
    std::process::exit(exit_code)
}

/// Where the session lives when the configuration does not say.
fn default_session_file() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".election-session.json")
}
