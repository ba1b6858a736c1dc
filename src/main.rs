use argh::FromArgs;
use corporal::{
    CommandError, Corporal, CorporalError, CorporalOptions, EditorSource, ErrorKind, FnCommand,
    LineSource, Next, SessionInput, ShellConfig,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: ErrorKind = ErrorKind::from_static("UsageError");

#[derive(FromArgs)]
/// A small interactive shell that remembers who you are.
struct Options {
    /// TOML file with `disabled`, `env` and `command_contexts` settings
    #[argh(option)]
    config: Option<PathBuf>,

    /// primary prompt template, e.g. "%(me)s$ "
    #[argh(option)]
    ps1: Option<String>,

    /// continuation prompt template
    #[argh(option)]
    ps2: Option<String>,

    /// comma-separated commands to leave out, e.g. "clear,help"
    #[argh(option)]
    disabled: Vec<String>,

    /// JSON object merged into the environment
    #[argh(option)]
    env: Option<String>,

    /// file to load and save line history (terminal only)
    #[argh(option)]
    history: Option<PathBuf>,
}

fn iam() -> FnCommand {
    FnCommand::new("Tell the session who you are.")
        .help("Usage: iam <name>")
        .invoke(|session, args| {
            let [name] = args.as_slice() else {
                return Err(CommandError::new(USAGE, "Usage: iam <name>"));
            };
            session.env_mut().set("me", name.as_str());
            Ok(())
        })
}

fn greet() -> FnCommand {
    FnCommand::new("Give a greeting to the current user.").invoke(|session, _| {
        let me = session.env().get_str("me").unwrap_or("unknown").to_string();
        writeln!(session.stdout(), "Hello, {me}")?;
        Ok(())
    })
}

fn options(args: Options) -> Result<CorporalOptions, CorporalError> {
    let mut options = CorporalOptions::new()
        .command("iam", iam())
        .command("greet", greet());
    for name in args.disabled.iter().flat_map(|d| d.split(',')) {
        let name = name.trim();
        if !name.is_empty() {
            options = options.disable(name);
        }
    }
    if let Some(ps1) = args.ps1 {
        options = options.env("ps1", ps1);
    }
    if let Some(ps2) = args.ps2 {
        options = options.env("ps2", ps2);
    }
    if let Some(env) = args.env {
        options = options.env_json(&env)?;
    }
    if let Some(path) = args.config {
        options = options.apply_config(ShellConfig::load(path)?);
    }
    options.env.entry("me").or_insert_with(|| "unknown".into());
    options.env.entry("ps1").or_insert_with(|| "%(me)s$ ".into());
    Ok(options)
}

async fn run(args: Options) -> Result<(), CorporalError> {
    let history = args.history.clone();
    let mut shell = Corporal::new(options(args)?).await?;
    shell.on_command_error(USAGE, |err, session| {
        if let Err(e) = writeln!(session.stderr(), "{}", err.message()) {
            warn!(error = %e, "failed to report usage error");
        }
        Next::Continue
    });

    let mut input: Box<dyn LineSource> = if std::io::stdin().is_terminal() {
        let editor = EditorSource::new()?;
        Box::new(match history {
            Some(path) => editor.with_history(path),
            None => editor,
        })
    } else {
        Box::new(SessionInput)
    };
    shell.run(input.as_mut()).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CORPORAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Options = argh::from_env();
    match run(args).await {
        Ok(()) => {
            info!("session ended");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
