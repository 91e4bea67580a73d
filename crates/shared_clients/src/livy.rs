use crate::polling::{PollStep, PollTimeout, PollingStrategy};
use common::config::components::connections::ConnectionDetails;
use common::error::diagnostics::DiagnosticMessage;
use common::utils::split_sql_statements;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(pub u64);

impl Display for StatementId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Starting,
    Idle,
    Busy,
    ShuttingDown,
    Error,
    Dead,
    Killed,
    Success,
    /// Any state this client does not know about; never terminal.
    #[default]
    #[serde(other)]
    Unknown,
}

impl SessionState {
    /// States from which a session can no longer become idle.
    pub fn is_start_failure(self) -> bool {
        matches!(
            self,
            SessionState::ShuttingDown
                | SessionState::Error
                | SessionState::Dead
                | SessionState::Killed
                | SessionState::Success
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementState {
    Waiting,
    Running,
    Available,
    Error,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl StatementState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatementState::Available | StatementState::Error | StatementState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatementOutput {
    pub status: String,
    #[serde(default)]
    pub evalue: Option<String>,
    #[serde(default)]
    pub traceback: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: SessionId,
    #[serde(default)]
    state: SessionState,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    id: StatementId,
    state: StatementState,
    #[serde(default)]
    output: Option<StatementOutput>,
}

#[derive(Debug, Error)]
pub enum LivyClientError {
    #[error("livy returned {status} {reason}: {context}")]
    Communication {
        status: u16,
        reason: String,
        context: DiagnosticMessage,
    },
    #[error("transport error: {context}")]
    Transport {
        context: DiagnosticMessage,
        #[source]
        source: reqwest::Error,
    },
    #[error("unable to start session: {context}")]
    SessionStart { context: DiagnosticMessage },
    #[error("statement execution failed: {context}")]
    StatementExecution {
        statement: String,
        context: DiagnosticMessage,
    },
    #[error("timed out: {context}")]
    Timeout { context: DiagnosticMessage },
    #[error("unexpected response: {context}")]
    UnexpectedResponse { context: DiagnosticMessage },
}

impl LivyClientError {
    #[track_caller]
    pub fn communication(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Communication {
            status,
            reason: reason.into(),
            context: DiagnosticMessage::new(body.into()),
        }
    }

    #[track_caller]
    pub fn session_start(session_id: SessionId, state: SessionState) -> Self {
        Self::SessionStart {
            context: DiagnosticMessage::about(
                format!("session {}", session_id),
                format!("session entered state {:?}", state),
            ),
        }
    }

    #[track_caller]
    pub fn statement_execution(statement: impl Into<String>, message: impl Display) -> Self {
        let statement = statement.into();
        let context = DiagnosticMessage::new(format!("Statement {} failed: {}", statement, message));
        Self::StatementExecution { statement, context }
    }

    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

impl From<reqwest::Error> for LivyClientError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LivyClientError::unexpected(format!("could not decode livy response: {}", err))
        } else {
            LivyClientError::Transport {
                context: DiagnosticMessage::new(err.to_string()),
                source: err,
            }
        }
    }
}

impl From<PollTimeout> for LivyClientError {
    #[track_caller]
    fn from(timeout: PollTimeout) -> Self {
        LivyClientError::Timeout {
            context: DiagnosticMessage::new(timeout.to_string()),
        }
    }
}

/// Client for the Livy REST API, running Spark SQL through interactive
/// `sql` sessions.
#[derive(Debug, Clone)]
pub struct LivyClient {
    host: String,
    user: String,
    password: String,
    extra: Map<String, Value>,
    polling: PollingStrategy,
    http: Client,
}

impl LivyClient {
    pub fn new(host: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            extra: Map::new(),
            polling: PollingStrategy::default(),
            http: Client::new(),
        }
    }

    /// Build a client from a `livy` connection: `extra` becomes part of the
    /// session creation body and `polling` tunes every wait loop.
    pub fn from_connection(details: &ConnectionDetails) -> Self {
        let client = Self::new(&details.host, &details.user, &details.password)
            .with_extra(details.extra.clone());
        match &details.polling {
            Some(polling) => client.with_polling(PollingStrategy::from_config(polling)),
            None => client,
        }
    }

    /// Additional session properties (`conf`, `driverMemory`, ...).
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_polling(mut self, polling: PollingStrategy) -> Self {
        self.polling = polling;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.host, path))
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, "application/json")
    }

    async fn check_response(&self, resp: Response) -> Result<Response, LivyClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        let body = resp.text().await.unwrap_or_default();
        error!("HTTP error: {}", reason);
        error!("{}", body);
        Err(LivyClientError::communication(status.as_u16(), reason, body))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, LivyClientError> {
        let resp = request.send().await?;
        self.check_response(resp).await
    }

    /// Start a `sql` session and wait for it to become idle.
    pub async fn create_session(&self) -> Result<SessionId, LivyClientError> {
        let mut body = Map::new();
        body.insert("kind".to_string(), json!("sql"));
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }

        let resp = self
            .send(self.request(Method::POST, "/sessions").json(&Value::Object(body)))
            .await?;
        let created: SessionResponse = resp.json().await?;
        let session_id = created.id;
        info!("Created livy session {}", session_id);

        if let Err(err) = self.wait_until_idle(session_id).await {
            if let Err(stop_err) = self.stop_session(session_id).await {
                warn!("Could not stop livy session {}: {}", session_id, stop_err);
            }
            return Err(err);
        }
        Ok(session_id)
    }

    async fn wait_until_idle(&self, session_id: SessionId) -> Result<(), LivyClientError> {
        let what = format!("livy session {} to become idle", session_id);
        self.polling
            .poll(&what, |_| async move {
                match self.session_state(session_id).await? {
                    SessionState::Idle => Ok(PollStep::Done(())),
                    state if state.is_start_failure() => {
                        Err(LivyClientError::session_start(session_id, state))
                    }
                    state => {
                        debug!("livy session {} is {:?}", session_id, state);
                        Ok(PollStep::Continue)
                    }
                }
            })
            .await
    }

    pub async fn session_state(&self, session_id: SessionId) -> Result<SessionState, LivyClientError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/sessions/{}", session_id)))
            .await?;
        let session: SessionResponse = resp.json().await?;
        Ok(session.state)
    }

    /// Submit one statement; Livy runs a session's statements one at a time.
    pub async fn run_statement(
        &self,
        session_id: SessionId,
        sql: &str,
    ) -> Result<StatementId, LivyClientError> {
        let resp = self
            .send(
                self.request(Method::POST, &format!("/sessions/{}/statements", session_id))
                    .json(&json!({ "code": sql })),
            )
            .await?;
        let statement: StatementResponse = resp.json().await?;
        debug!("Submitted statement {} to session {}", statement.id, session_id);
        Ok(statement.id)
    }

    /// Poll a statement once.
    ///
    /// Livy reports a failed statement as `available` with an `error`
    /// output; such statements come back as [`StatementState::Error`] with
    /// the error value and traceback as message.
    pub async fn get_state(
        &self,
        session_id: SessionId,
        statement_id: StatementId,
    ) -> Result<(StatementState, String), LivyClientError> {
        let resp = self
            .send(self.request(
                Method::GET,
                &format!("/sessions/{}/statements/{}", session_id, statement_id),
            ))
            .await?;
        let statement: StatementResponse = resp.json().await?;

        match statement.output {
            Some(output) if output.status == "error" => {
                let message = format!(
                    "Error: {}\nTraceback: {}",
                    output.evalue.unwrap_or_default(),
                    output.traceback.join("")
                );
                Ok((StatementState::Error, message))
            }
            _ => Ok((statement.state, String::new())),
        }
    }

    pub async fn stop_session(&self, session_id: SessionId) -> Result<(), LivyClientError> {
        self.send(self.request(Method::DELETE, &format!("/sessions/{}", session_id)))
            .await?;
        debug!("Stopped livy session {}", session_id);
        Ok(())
    }

    /// Run one or more scripts in a fresh session, one statement at a time.
    ///
    /// The session is stopped afterwards whether the statements succeed or
    /// not. The first failing statement ends the run.
    pub async fn run<S: AsRef<str>>(&self, scripts: &[S]) -> Result<(), LivyClientError> {
        let statements: Vec<String> = scripts
            .iter()
            .flat_map(|script| split_sql_statements(script.as_ref()))
            .collect();
        info!("Running {} statements.", statements.len());
        if statements.is_empty() {
            return Ok(());
        }

        let session_id = self.create_session().await?;
        match self.run_in_session(session_id, &statements).await {
            Ok(()) => {
                info!("All statements executed successfully.");
                self.stop_session(session_id).await
            }
            Err(err) => {
                if let Err(stop_err) = self.stop_session(session_id).await {
                    warn!("Could not stop livy session {}: {}", session_id, stop_err);
                }
                Err(err)
            }
        }
    }

    async fn run_in_session(
        &self,
        session_id: SessionId,
        statements: &[String],
    ) -> Result<(), LivyClientError> {
        for (i, statement) in statements.iter().enumerate() {
            let statement_id = self.run_statement(session_id, statement).await?;
            let what = format!("statement {} in livy session {}", statement_id, session_id);
            let (state, message) = self
                .polling
                .poll(&what, |_| async move {
                    let (state, message) = self.get_state(session_id, statement_id).await?;
                    Ok::<_, LivyClientError>(if state.is_terminal() {
                        PollStep::Done((state, message))
                    } else {
                        PollStep::Continue
                    })
                })
                .await?;

            if state == StatementState::Available {
                info!("Statement number {} completed.", i);
            } else {
                error!("Statement {} failed: \n{}", statement, message);
                return Err(LivyClientError::statement_execution(statement.as_str(), message));
            }
        }
        Ok(())
    }
}
