//! The request server as a child process.
//!
//! The child's stdout carries newline-delimited bridge messages to this
//! process; its stdin is the return path.  stderr is inherited so the
//! child's own logs land next to ours.

use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;

use crate::bridge::BridgeEndpoint;
use crate::config::ServerConfig;

use super::RequestServer;

#[derive(Debug)]
pub struct ChildProcessServer {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ChildProcessServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            child: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestServer for ChildProcessServer {
    fn start(&self) -> anyhow::Result<BridgeEndpoint> {
        let mut slot = self.slot();
        if slot.is_some() {
            anyhow::bail!("request server `{}` is already running", self.program);
        }

        let mut child = ProcessCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program))?;

        let stdout = child.stdout.take().context("child stdout was not captured")?;
        let stdin = child.stdin.take().context("child stdin was not captured")?;

        log::info!(
            "orchestrator: request server `{}` started (pid {})",
            self.program,
            child.id()
        );
        *slot = Some(child);
        Ok(BridgeEndpoint::from_streams(stdout, stdin))
    }

    fn stop(&self) {
        let Some(mut child) = self.slot().take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                log::info!("orchestrator: request server already exited ({status})");
                return;
            }
            Ok(None) => {}
            Err(e) => log::warn!("orchestrator: cannot query request server: {e}"),
        }

        if let Err(e) = child.kill() {
            log::warn!("orchestrator: failed to kill request server: {e}");
        }
        match child.wait() {
            Ok(status) => log::info!("orchestrator: request server stopped ({status})"),
            Err(e) => log::error!("orchestrator: failed to reap request server: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::{BridgeMessage, Command};
    use std::time::{Duration, Instant};

    fn shell(script: &str) -> ChildProcessServer {
        ChildProcessServer::new(&ServerConfig {
            enabled: true,
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        })
    }

    fn next_message(endpoint: &mut BridgeEndpoint) -> Option<BridgeMessage> {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if let Ok(Some(message)) = endpoint.try_recv() {
                return Some(message);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn child_stdout_feeds_the_bridge() {
        let server = shell(r#"echo '{"kind":"command","module":"media","reload":true}'; sleep 5"#);
        let mut endpoint = server.start().unwrap();

        assert_eq!(
            next_message(&mut endpoint),
            Some(BridgeMessage::Command(Command::reload("media")))
        );

        let start = Instant::now();
        server.stop();
        assert!(start.elapsed() < Duration::from_secs(4), "stop waited for the child");
    }

    #[test]
    fn replies_reach_the_child_stdin() {
        // The child echoes what it receives back on stdout.
        let server = shell("head -n 1");
        let mut endpoint = server.start().unwrap();

        endpoint.send(&BridgeMessage::ServerExited).unwrap();
        assert_eq!(next_message(&mut endpoint), Some(BridgeMessage::ServerExited));
        server.stop();
    }

    #[test]
    fn missing_program_fails_to_start() {
        let server = ChildProcessServer::new(&ServerConfig {
            enabled: true,
            program: "/nonexistent/ami-server".into(),
            args: Vec::new(),
        });
        let err = server.start().unwrap_err();
        assert!(format!("{err:#}").contains("failed to spawn"), "{err:#}");
    }

    #[test]
    fn second_start_is_refused() {
        let server = shell("sleep 5");
        let _endpoint = server.start().unwrap();
        assert!(server.start().is_err());
        server.stop();
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        shell("true").stop();
    }
}
