//! Request handler for the bridge
//!
//! Owns at most one debugger session and translates bridge commands into
//! resolver calls.

use crate::common::error::BridgeError;
use crate::common::Result;
use crate::gdb::{AddressQuery, LineQuery, Session, SessionOptions};
use crate::resolver::Resolver;

use super::protocol::{BridgeCommand, HighlightScope, Reply};

/// Per-connection bridge state
pub struct Handler {
    options: SessionOptions,
    resolver: Resolver,
    session: Option<Session>,
}

impl Handler {
    pub fn new(options: SessionOptions, resolver: Resolver) -> Self {
        Self {
            options,
            resolver,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Handle one request line and produce its reply
    pub async fn handle_line(&mut self, line: &str) -> Reply {
        let command = match BridgeCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(request = %line.trim(), error = %e.message, "Invalid request");
                return Reply::Error(e);
            }
        };

        tracing::debug!(?command, "Received command");
        match self.handle_command(command).await {
            Ok(reply) => reply,
            Err(e) => Reply::Error(e),
        }
    }

    async fn handle_command(
        &mut self,
        command: BridgeCommand,
    ) -> std::result::Result<Reply, BridgeError> {
        match command {
            BridgeCommand::InitGdb { target } => {
                self.close().await;
                let session = Session::start(self.options.clone(), &target)
                    .await
                    .map_err(|e| BridgeError::from(&e))?;
                tracing::info!(binary = %target.display(), "Session ready");
                self.session = Some(session);
                Ok(Reply::Ready {
                    target: target.display().to_string(),
                })
            }

            BridgeCommand::InitDisassembly { .. }
            | BridgeCommand::Highlight {
                scope: HighlightScope::Disassembly,
                ..
            } => Err(BridgeError::new(
                "UNSUPPORTED",
                "disassembly views are handled by the editor",
            )),

            BridgeCommand::Highlight { pc, .. } => {
                let session = self.require_session()?;
                let result = self
                    .resolver
                    .resolve_address(session, AddressQuery::new(pc))
                    .await;
                let location = self.check(result).await?;
                Ok(Reply::location(pc, location))
            }

            BridgeCommand::Breakpoint { file, line } => {
                let query =
                    LineQuery::new(file.clone(), line).map_err(|e| BridgeError::from(&e))?;
                let session = self.require_session()?;
                let result = self.resolver.resolve_breakpoint(session, query).await;
                let pc = self.check(result).await?;
                Ok(Reply::Breakpoint { file, line, pc })
            }
        }
    }

    fn require_session(&self) -> std::result::Result<&Session, BridgeError> {
        self.session.as_ref().ok_or_else(|| {
            BridgeError::new(
                "NO_SESSION",
                "no debugger session; send 'init gdb <path>' first",
            )
        })
    }

    /// Drop the session after errors it cannot recover from
    async fn check<T>(&mut self, result: Result<T>) -> std::result::Result<T, BridgeError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_fatal_to_session() {
                    tracing::warn!(error = %e, "Debugger session lost");
                    self.close().await;
                }
                Err(BridgeError::from(&e))
            }
        }
    }

    /// Shut down the current session, if any
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(binary = %session.target().display(), "Closing session");
            session.shutdown().await;
        }
    }
}
