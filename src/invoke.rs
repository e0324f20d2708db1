//! External process invocation.
//!
//! Every command is built from a literal argv; nothing here goes through a
//! shell. Failing to find or spawn the program is an `Err`, while a program
//! that runs and exits non-zero is an ordinary `CommandOutput`.
use anyhow::{anyhow, Context, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single process run request.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }

    pub fn cwd(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_line(&self) -> String {
        format_command_line(&self.argv)
    }
}

/// Captured result of a process that was spawned and waited on.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Short human description of how the process ended.
    pub fn status_string(&self) -> String {
        if self.timed_out {
            return format!("timed out after {:.1}s", self.duration.as_secs_f64());
        }
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exit {code}"),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "terminated".to_string(),
        }
    }
}

/// The target tool as an argv prefix.
///
/// `wrapper` lets an outer instrumentation command (for example a coverage
/// runner) own the front of the command line; the harness only appends.
#[derive(Debug, Clone, Default)]
pub struct ToolCommand {
    pub wrapper: Vec<String>,
    pub program: String,
    pub base_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ToolCommand {
    pub fn argv<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut argv =
            Vec::with_capacity(self.wrapper.len() + 1 + self.base_args.len() + args.len());
        argv.extend(self.wrapper.iter().cloned());
        argv.push(self.program.clone());
        argv.extend(self.base_args.iter().cloned());
        argv.extend(args.iter().map(|arg| arg.as_ref().to_string()));
        argv
    }

    pub fn invocation<S: AsRef<str>>(&self, args: &[S]) -> Invocation {
        Invocation {
            argv: self.argv(args),
            cwd: None,
            env: self.env.clone(),
            timeout: None,
        }
    }

    /// Executable that will actually be spawned (first wrapper word, or the program).
    pub fn executable(&self) -> &str {
        self.wrapper.first().unwrap_or(&self.program)
    }
}

/// Locate `program` the way the invoker will spawn it.
pub fn resolve_program(program: &str) -> Result<PathBuf> {
    if program.trim().is_empty() {
        return Err(anyhow!("program name is empty"));
    }
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        let path = PathBuf::from(program);
        if !path.is_file() {
            return Err(anyhow!("program not found: {}", path.display()));
        }
        // A relative program path would be ambiguous once the child's cwd changes.
        return path
            .canonicalize()
            .with_context(|| format!("resolve program {}", path.display()));
    }
    which::which(program).with_context(|| format!("program not found on PATH: {program}"))
}

/// Run an invocation to completion, capturing both output streams.
pub fn invoke(invocation: &Invocation) -> Result<CommandOutput> {
    let (program, args) = invocation
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("invocation argv is empty"))?;
    let program_path = resolve_program(program)?;

    let mut cmd = Command::new(&program_path);
    cmd.args(args);
    if let Some(cwd) = &invocation.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    tracing::debug!(command = %invocation.command_line(), "spawn");
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", program_path.display()))?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let (status, timed_out) = wait_for_exit(&mut child, invocation.timeout)
        .with_context(|| format!("wait for {}", program_path.display()))?;
    let duration = started.elapsed();

    // Grandchildren of a killed process can hold the pipes open, so the
    // readers are detached rather than joined after a timeout.
    let (stdout, stderr) = if timed_out {
        (Vec::new(), Vec::new())
    } else {
        (
            join_reader(stdout_reader).context("read stdout")?,
            join_reader(stderr_reader).context("read stderr")?,
        )
    };

    Ok(CommandOutput {
        exit_code: if timed_out { None } else { status.code() },
        signal: exit_signal(&status),
        timed_out,
        stdout,
        stderr,
        duration,
    })
}

fn wait_for_exit(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait()?, false));
    };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if started.elapsed() > timeout {
            // The child may exit between try_wait and kill.
            let _ = child.kill();
            let status = child.wait()?;
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: Option<R>,
) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_reader(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match handle {
        Some(handle) => {
            let bytes = handle
                .join()
                .map_err(|_| anyhow!("output reader thread panicked"))??;
            Ok(bytes)
        }
        None => Ok(Vec::new()),
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Shell-quoted rendering of an argv, for logs and reports only.
pub fn format_command_line<S: AsRef<str>>(argv: &[S]) -> String {
    shell_words::join(argv.iter().map(|arg| arg.as_ref()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    #[test]
    fn captures_streams_and_exit_code() {
        let output = invoke(&sh("printf out; printf err >&2; exit 3")).unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert!(!output.timed_out);
        assert_eq!(output.stdout, b"out");
        assert_eq!(output.stderr, b"err");
        assert_eq!(output.status_string(), "exit 3");
    }

    #[test]
    fn missing_program_is_an_error_not_an_output() {
        let err = invoke(&Invocation::new(vec![
            "definitely-not-a-real-program-4821".to_string()
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("program not found"), "{err}");

        let err = invoke(&Invocation::new(vec!["/no/such/dir/tool".to_string()])).unwrap_err();
        assert!(err.to_string().contains("/no/such/dir/tool"), "{err}");
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(invoke(&Invocation::new(Vec::new())).is_err());
    }

    #[test]
    fn arguments_with_spaces_are_passed_literally() {
        let invocation = Invocation::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf '%s|' \"$@\"".to_string(),
            "sh".to_string(),
            "a b".to_string(),
            "$HOME".to_string(),
            "it's".to_string(),
        ]);
        let output = invoke(&invocation).unwrap();
        assert_eq!(output.stdout_text(), "a b|$HOME|it's|");
    }

    #[test]
    fn runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = invoke(&sh("pwd").cwd(dir.path())).unwrap();
        let reported = PathBuf::from(output.stdout_text().trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn timeout_kills_and_reports() {
        let output = invoke(&sh("exec sleep 5").timeout(Some(Duration::from_millis(100)))).unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
        assert_eq!(output.exit_code, None);
        assert!(output.duration < Duration::from_secs(5));
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let output = invoke(&sh("head -c 1000000 /dev/zero").timeout(Some(Duration::from_secs(20))))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.len(), 1_000_000);
    }

    #[test]
    fn tool_command_composes_wrapper_prefix() {
        let tool = ToolCommand {
            wrapper: vec!["coverage".into(), "run".into(), "-p".into(), "-m".into()],
            program: "truvari".to_string(),
            base_args: Vec::new(),
            env: BTreeMap::new(),
        };
        assert_eq!(
            tool.argv(&["version"]),
            vec!["coverage", "run", "-p", "-m", "truvari", "version"]
        );
        assert_eq!(tool.executable(), "coverage");

        let bare = ToolCommand {
            program: "truvari".to_string(),
            ..ToolCommand::default()
        };
        assert_eq!(bare.executable(), "truvari");
    }

    #[test]
    fn command_line_quotes_special_characters() {
        assert_eq!(
            format_command_line(&["tool", "a b", "plain"]),
            "tool 'a b' plain"
        );
    }
}
