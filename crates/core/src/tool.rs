//! Compiler-cache CLI invocation
//!
//! Commands are always built as argument vectors; the shell is never involved.
//! [`CommandRunner`] is the seam between orchestration and the OS so setup and
//! save can be exercised against [`mock::MockRunner`].

use crate::errors::{Result, ToolError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and extra environment, waiting for completion
    ///
    /// A program that cannot be found yields [`ToolError::NotInstalled`].
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> std::result::Result<CommandOutput, ToolError>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    #[instrument(skip(self, env))]
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> std::result::Result<CommandOutput, ToolError> {
        debug!("Executing: {}", display_command(program, args));

        let output = tokio::process::Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::NotInstalled {
                        tool: program.to_string(),
                    }
                } else {
                    ToolError::Spawn {
                        command: display_command(program, args),
                        reason: e.to_string(),
                    }
                }
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Shell-quoted rendering of a command line, for logs only
pub fn display_command(program: &str, args: &[&str]) -> String {
    shell_words::join(std::iter::once(program).chain(args.iter().copied()))
}

/// Run a command and fail on a non-zero exit code
pub async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<CommandOutput> {
    info!("{}", display_command(program, args));
    let output = runner.run(program, args, env).await?;
    if !output.success() {
        return Err(ToolError::CommandFailed {
            command: display_command(program, args),
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
        .into());
    }
    Ok(output)
}

/// Whether `program --version` can be executed successfully
pub async fn is_installed(runner: &dyn CommandRunner, program: &str) -> bool {
    match runner.run(program, &["--version"], &[]).await {
        Ok(output) => output.success(),
        Err(e) => {
            debug!("{} not usable: {}", program, e);
            false
        }
    }
}

/// Locate an executable on `PATH`
pub fn find_in_path(program: &str, exe_suffix: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let file_name = format!("{}{}", program, exe_suffix);
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub mod mock {
    //! Scriptable command runner for tests
    //!
    //! Responses are matched on the program and arguments joined by single
    //! spaces (`"ccache -s -v"`); unmatched commands succeed with empty output.

    use super::{CommandOutput, CommandRunner};
    use crate::errors::ToolError;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// One recorded invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        pub program: String,
        pub args: Vec<String>,
        pub env: Vec<(String, String)>,
    }

    impl Invocation {
        pub fn command_line(&self) -> String {
            plain_command_line(&self.program, self.args.iter().map(String::as_str))
        }
    }

    #[derive(Debug, Default)]
    pub struct MockRunner {
        responses: Mutex<HashMap<String, CommandOutput>>,
        missing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the output for a command line
        pub fn respond(&self, command_line: &str, output: CommandOutput) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .insert(command_line.to_string(), output);
            self
        }

        /// Make every invocation of `program` fail as not installed
        pub fn missing_program(&self, program: &str) -> &Self {
            self.missing.lock().unwrap().insert(program.to_string());
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Rendered command lines in call order
        pub fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::command_line).collect()
        }

        pub fn was_called(&self, command_line: &str) -> bool {
            self.command_lines().iter().any(|c| c == command_line)
        }
    }

    fn plain_command_line<'a>(program: &'a str, args: impl Iterator<Item = &'a str>) -> String {
        std::iter::once(program).chain(args).collect::<Vec<_>>().join(" ")
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(
            &self,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
        ) -> Result<CommandOutput, ToolError> {
            self.calls.lock().unwrap().push(Invocation {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                env: env
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });

            if self.missing.lock().unwrap().contains(program) {
                return Err(ToolError::NotInstalled {
                    tool: program.to_string(),
                });
            }

            let key = plain_command_line(program, args.iter().copied());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_default())
        }
    }
}
