//! Actor adapter: a ractor actor owns the SQLite pool and handles one
//! message at a time, so every statement on that database is serialized.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use strata_core::{QueryResult, Statement, StatementResult};
use tracing::info;

use super::sqlite::SqliteEngine;
use super::{Adapter, AdapterKind};
use crate::error::{ConfigError, Result};

/// Messages handled by the SQL actor.
#[derive(Debug)]
pub enum SqlActorMessage {
    /// Execute one statement.
    Exec(Statement, RpcReplyPort<StatementResult>),

    /// Execute statements in one transaction.
    Batch(Vec<Statement>, RpcReplyPort<StatementResult>),
}

/// Cloneable handle to a running SQL actor.
#[derive(Debug, Clone)]
pub struct SqlActorHandle {
    actor: ActorRef<SqlActorMessage>,
}

impl SqlActorHandle {
    /// Spawns an actor owning `pool`. Named actors must be unique in the
    /// process.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Actor`] when the actor cannot start.
    pub async fn spawn(name: Option<String>, pool: SqlitePool) -> Result<Self> {
        let (actor, _jh) = Actor::spawn(name, SqlActor, pool)
            .await
            .map_err(|e| ConfigError::Actor(format!("failed to spawn SqlActor: {e}")))?;
        Ok(Self { actor })
    }

    /// Executes one statement on the actor.
    pub async fn exec(&self, statement: Statement) -> StatementResult {
        ractor::call!(self.actor, SqlActorMessage::Exec, statement).unwrap_or_else(|e| {
            QueryResult::failure(format!("SqlActor Exec RPC failed: {e}"))
        })
    }

    /// Executes a batch on the actor.
    pub async fn batch(&self, statements: Vec<Statement>) -> StatementResult {
        ractor::call!(self.actor, SqlActorMessage::Batch, statements).unwrap_or_else(|e| {
            QueryResult::failure(format!("SqlActor Batch RPC failed: {e}"))
        })
    }

    /// Stops the actor; later calls fail with an RPC error result.
    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

struct SqlActorState {
    engine: SqliteEngine,
}

struct SqlActor;

#[ractor::async_trait]
impl Actor for SqlActor {
    type Msg = SqlActorMessage;
    type State = SqlActorState;
    type Arguments = SqlitePool;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        pool: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        info!("SqlActor initialized");
        Ok(SqlActorState {
            engine: SqliteEngine::new(pool),
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            SqlActorMessage::Exec(statement, reply) => {
                let res = state.engine.exec(&statement).await;
                let _ = reply.send(res);
            }
            SqlActorMessage::Batch(statements, reply) => {
                let res = state.engine.batch(&statements).await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

/// Adapter forwarding statements to a [`SqlActorHandle`].
#[derive(Debug, Clone)]
pub struct ActorAdapter {
    handle: SqlActorHandle,
}

impl ActorAdapter {
    /// Wraps a handle.
    #[must_use]
    pub const fn new(handle: SqlActorHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Adapter for ActorAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Actor
    }

    async fn exec(&self, statement: &Statement, _bookmark: Option<&str>) -> StatementResult {
        self.handle.exec(statement.clone()).await
    }

    async fn batch(&self, statements: &[Statement], _bookmark: Option<&str>) -> StatementResult {
        self.handle.batch(statements.to_vec()).await
    }
}
