use anyhow::Result;
use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Run the corporal binary with `input` piped to stdin.
fn run_corporal(args: &[&str], input: &str) -> Result<Output> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_corporal"))
        .args(args)
        .env_remove("CORPORAL_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }
    Ok(child.wait_with_output()?)
}

#[test]
fn test_help_then_quit() -> Result<()> {
    let output = run_corporal(&[], "help\nquit\ngreet\n")?;
    assert!(output.status.success(), "quit should exit cleanly");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("List of available commands:"));
    assert!(stdout.contains("greet:  Give a greeting to the current user."));
    assert!(stdout.contains("iam  :  Tell the session who you are."));
    assert!(!stdout.contains("Hello"), "nothing runs after quit");
    Ok(())
}

#[test]
fn test_unknown_command_reports_on_stderr() -> Result<()> {
    let output = run_corporal(&["--ps1", ""], "bleh\n")?;
    assert!(output.status.success(), "end of input should exit cleanly");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid command: bleh"));
    assert!(stderr.contains("List of available commands:"));
    assert!(output.stdout.is_empty());
    Ok(())
}

#[test]
fn test_iam_changes_prompt_and_greeting() -> Result<()> {
    let output = run_corporal(&[], "greet\niam branden\ngreet\n")?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unknown$ Hello, unknown\n"));
    assert!(stdout.contains("branden$ Hello, branden\n"));
    Ok(())
}

#[test]
fn test_iam_usage_error_is_handled() -> Result<()> {
    let output = run_corporal(&[], "iam\ngreet\n")?;
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage: iam <name>"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Hello, unknown"));
    Ok(())
}

#[test]
fn test_disabled_builtin() -> Result<()> {
    let output = run_corporal(&["--disabled", "clear,quit"], "help\nquit\n")?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("clear"));
    assert!(!stdout.contains("Quit the interactive shell."));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid command: quit"));
    Ok(())
}

#[test]
fn test_env_option_sets_variables() -> Result<()> {
    let output = run_corporal(&["--env", r#"{"me": "json"}"#], "greet\n")?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("json$ Hello, json"));

    let output = run_corporal(&["--env", "[1]"], "")?;
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[test]
fn test_config_file() -> Result<()> {
    let mut config = tempfile::NamedTempFile::new()?;
    write!(
        config,
        r#"
[env]
me = "configured"
ps1 = "[%(me)s] "

[env.corporal_command_settings.help]
hide = ["clear", "iam"]
"#
    )?;
    let path = config.path().to_string_lossy().into_owned();

    let output = run_corporal(&["--config", &path], "help\ngreet\n")?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[configured] "));
    assert!(stdout.contains("Hello, configured"));
    assert!(stdout.contains("greet:  Give a greeting to the current user."));
    assert!(!stdout.contains("clear"));
    assert!(!stdout.contains("iam"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let output = run_corporal(&["--config", "/definitely/not/here.toml"], "")?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unable to read config file"));
    Ok(())
}
