//! Scripted executor for unit tests

use async_trait::async_trait;
use std::sync::Mutex;

use super::{CommandOutput, ExecOptions, ProcessExecutor};
use crate::error::{Result, SandboxError};

struct Rule {
    pattern: String,
    response: std::result::Result<String, String>,
    once: bool,
}

/// Answers commands by substring match, first rule wins. Unmatched
/// commands succeed with empty output. Every command is recorded.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, pattern: &str, stdout: &str) -> Self {
        self.push(pattern, Ok(stdout.to_string()), false)
    }

    pub fn fail(self, pattern: &str, stderr: &str) -> Self {
        self.push(pattern, Err(stderr.to_string()), false)
    }

    pub fn fail_once(self, pattern: &str, stderr: &str) -> Self {
        self.push(pattern, Err(stderr.to_string()), true)
    }

    fn push(self, pattern: &str, response: std::result::Result<String, String>, once: bool) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            response,
            once,
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    /// Position of the first recorded call containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(pattern))
    }
}

#[async_trait]
impl ProcessExecutor for ScriptedExecutor {
    async fn run(&self, command: &str, _opts: &ExecOptions) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.to_string());

        let mut rules = self.rules.lock().unwrap();
        let Some(index) = rules.iter().position(|r| command.contains(&r.pattern)) else {
            return Ok(CommandOutput::default());
        };
        let response = if rules[index].once {
            rules.remove(index).response
        } else {
            rules[index].response.clone()
        };

        match response {
            Ok(stdout) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Err(stderr) => Err(SandboxError::CommandFailed {
                command: command.to_string(),
                code: Some(1),
                stderr,
            }),
        }
    }
}
