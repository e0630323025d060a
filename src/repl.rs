use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};
use tracing::warn;

use hummify::cli_style::{
    get_prompt, get_styles, print_capabilities, print_error, print_goodbye, print_key_value,
    print_page, print_success, print_transport, print_warning, print_welcome,
};
use hummify::shell::AppShell;
use hummify::upload::MediaKind;

const CARD_COLUMNS: usize = 3;

#[derive(Parser)]
#[command(styles=get_styles(), name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Loads a mapper JSON file. Clears datasets, query file and results.
    Mapper { path: PathBuf },

    /// Uploads a ZIP dataset of the given kind, together with the mapper.
    Dataset { kind: MediaKind, path: PathBuf },

    /// Picks the file to search with, matching the current view.
    Query {
        path: PathBuf,

        /// The file is a hummed WAV recording.
        #[arg(long)]
        recorded: bool,
    },

    /// Runs the similarity search with the picked query file.
    Search {
        /// Minimum similarity in percent.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Switches between the audio and image views.
    View { kind: MediaKind },

    /// Filters cards by title or singer. No text clears the filter.
    Filter { text: Vec<String> },

    /// Shows the current page of cards.
    List,

    /// Goes to the given page.
    Page { page: usize },

    /// Goes to the next page.
    Next,

    /// Goes to the previous page.
    Prev,

    /// Loads and plays the song of the card with the given number.
    Play { index: usize },

    /// Pauses playback.
    Pause,

    /// Resumes playback.
    Resume,

    /// Stops playback and rewinds.
    Stop,

    /// Jumps to the given second of the song.
    Seek { seconds: f64 },

    /// Sets the volume, 0 to 100.
    Volume { percent: f32 },

    /// Unloads the song.
    Eject,

    /// Shows the session, what can be done next and the player.
    Status,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

fn failed(err: anyhow::Error) -> CommandExecutionResult {
    CommandExecutionResult::Error(format!("{:#}", err))
}

async fn execute_command(line: String, shell: &mut AppShell) -> CommandExecutionResult {
    if line.trim().is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    let cli = match cli {
        Ok(cli) => cli,
        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
            return CommandExecutionResult::Ok;
        }
    };

    match cli.command {
        InnerCommand::Mapper { path } => match shell.load_mapper(path).await {
            Ok(info) => {
                print_success(&format!("Loaded {} ({} songs)", info.file_name, info.songs));
                print_page(&shell.page(), CARD_COLUMNS);
            }
            Err(err) => return failed(err),
        },
        InnerCommand::Dataset { kind, path } => match shell.upload_dataset(kind, path).await {
            Ok(response) => print_success(&response.status),
            Err(err) => return failed(err),
        },
        InnerCommand::Query { path, recorded } => match shell.submit_content(path, recorded).await {
            Ok(info) => print_success(&format!("Ready to search with {}", info.file_name)),
            Err(err) => return failed(err),
        },
        InnerCommand::Search { threshold } => match shell.run_query(threshold).await {
            Ok(info) => {
                match info.highest_similarity {
                    Some(best) => print_success(&format!(
                        "{} matches, best {:.1}%",
                        info.matches, best
                    )),
                    None => print_warning("No matches"),
                }
                print_page(&shell.page(), CARD_COLUMNS);
            }
            Err(err) => return failed(err),
        },
        InnerCommand::View { kind } => {
            shell.set_view(kind).await;
            print_capabilities(&shell.capabilities());
        }
        InnerCommand::Filter { text } => {
            shell.set_search_text(text.join(" "));
            print_page(&shell.page(), CARD_COLUMNS);
        }
        InnerCommand::List => print_page(&shell.page(), CARD_COLUMNS),
        InnerCommand::Page { page } => {
            if !shell.change_page(page) {
                return CommandExecutionResult::Error(format!("There is no page {}", page));
            }
            print_page(&shell.page(), CARD_COLUMNS);
        }
        InnerCommand::Next => {
            if shell.next_page() {
                print_page(&shell.page(), CARD_COLUMNS);
            } else {
                print_warning("Already on the last page");
            }
        }
        InnerCommand::Prev => {
            if shell.previous_page() {
                print_page(&shell.page(), CARD_COLUMNS);
            } else {
                print_warning("Already on the first page");
            }
        }
        InnerCommand::Play { index } => match shell.play_entry(index).await {
            Ok(status) => print_transport(&status),
            Err(err) => return failed(err),
        },
        InnerCommand::Pause => {
            if let Err(err) = shell.pause().await {
                return failed(err);
            }
            print_transport(&shell.player_status());
        }
        InnerCommand::Resume => {
            if let Err(err) = shell.resume().await {
                return failed(err);
            }
            print_transport(&shell.player_status());
        }
        InnerCommand::Stop => {
            if let Err(err) = shell.stop().await {
                return failed(err);
            }
            print_transport(&shell.player_status());
        }
        InnerCommand::Seek { seconds } => {
            if let Err(err) = shell.seek(seconds).await {
                return failed(err);
            }
            print_transport(&shell.player_status());
        }
        InnerCommand::Volume { percent } => {
            if let Err(err) = shell.set_volume(percent / 100.0).await {
                return failed(err);
            }
            print_transport(&shell.player_status());
        }
        InnerCommand::Eject => {
            if let Err(err) = shell.eject().await {
                return failed(err);
            }
        }
        InnerCommand::Status => {
            let session = shell.session();
            print_key_value("Session", session.stage());
            if let Some(mapper) = session.mapper() {
                print_key_value("Mapper", &format!("{} ({} songs)", mapper.file_name, mapper.songs));
            }
            if let Some(datasets) = session.datasets() {
                for dataset in [&datasets.audio, &datasets.image].into_iter().flatten() {
                    print_key_value(
                        &format!("{} dataset", dataset.kind),
                        &format!("{} ({} files)", dataset.file_name, dataset.members),
                    );
                }
            }
            if let Some(content) = session.content() {
                print_key_value("Query file", &content.file_name);
            }
            print_capabilities(&shell.capabilities());
            print_transport(&shell.player_status());
        }
        InnerCommand::Exit => return CommandExecutionResult::Exit,
    }
    CommandExecutionResult::Ok
}

#[derive(rustyline_derive::Hinter)]
struct ShellHelper {
    commands_names: Vec<String>,
}

impl ShellHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        ShellHelper { commands_names }
    }
}

impl Completer for ShellHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for ShellHelper {}
impl Validator for ShellHelper {}
impl Helper for ShellHelper {}

/// Run the interactive shell until `exit`, CTRL-C or CTRL-D.
pub async fn run(mut shell: AppShell, backend_url: &str, history: Option<PathBuf>) -> Result<()> {
    print_welcome(backend_url);

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<ShellHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(ShellHelper::new()));
    if let Some(path) = &history {
        if rl.load_history(path).is_err() {
            warn!("No previous history at {:?}", path);
        }
    }

    let prompt = get_prompt();
    loop {
        let readline = tokio::task::block_in_place(|| rl.readline(&prompt));

        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &mut shell).await {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        print_error(&err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                print_error(&format!("{:?}", e));
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Err(err) = rl.save_history(path) {
            warn!("Failed to save history to {:?}: {}", path, err);
        }
    }
    shell.shutdown().await;
    print_goodbye();
    Ok(())
}
