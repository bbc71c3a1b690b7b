use std::io::Write;
use std::process::{Command, Stdio};

use crate::Tokenizer;

/// Engine reached by spawning an external analyzer per request, feeding
/// the text on stdin and reading the tabular response from stdout.
///
/// Failures (missing binary, IO error, non-UTF-8 output) are logged and
/// reported as `None`; the caller skips the node.
pub struct SubprocessTokenizer {
    program: String,
    args: Vec<String>,
}

impl SubprocessTokenizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        SubprocessTokenizer {
            program: program.into(),
            args,
        }
    }
}

impl Tokenizer for SubprocessTokenizer {
    fn tokenize(&mut self, text: &str) -> Option<String> {
        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                log::warn!("analyzer spawn failed ({}): {err}", self.program);
                return None;
            }
        };

        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            if let Err(err) = stdin.write_all(text.as_bytes()) {
                log::warn!("analyzer stdin write failed: {err}");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            // Dropping stdin closes the pipe so the engine sees EOF.
        }

        let output = match child.wait_with_output() {
            Ok(output) => output,
            Err(err) => {
                log::warn!("analyzer wait failed: {err}");
                return None;
            }
        };
        if !output.status.success() {
            log::warn!("analyzer exited with {}", output.status);
            return None;
        }
        match String::from_utf8(output.stdout) {
            Ok(raw) => Some(raw),
            Err(err) => {
                log::warn!("analyzer produced non-UTF-8 output: {err}");
                None
            }
        }
    }
}
