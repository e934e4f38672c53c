//! Remote document parsing: submit, poll until terminal, fetch the results.
//!
//! The remote parser is asynchronous. A submission returns a task id; the
//! task is then queried at a fixed interval until it succeeds, fails, or the
//! wait budget in [`PollPolicy`] runs out. The lifecycle is an explicit state
//! machine ([`TaskState::transition`]) so the budget arithmetic is testable
//! without a network.
//!
//! ```text
//! Submitted ──query──▶ Polling ──query──▶ … ──▶ Succeeded | Failed | TimedOut
//! ```
//!
//! The budget is wall-clock time since submission, so time spent inside a
//! slow status query counts against it. A query still pending when the budget
//! runs out is abandoned.

use crate::config::{Credentials, PollPolicy};
use crate::document::{ParseResult, RemoteResult};
use crate::error::ConvertError;
use crate::pipeline::encode::encode_bytes;
use crate::progress::ProgressCallback;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/oauth/2.0/token";
const SUBMIT_PATH: &str = "/rest/2.0/brain/online/v2/parser/task";
const QUERY_PATH: &str = "/rest/2.0/brain/online/v2/parser/task/query";
const GENERAL_OCR_PATH: &str = "/rest/2.0/ocr/v1/general_basic";

// ── Task lifecycle ───────────────────────────────────────────────────────────

/// What one status query observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Success {
        markdown_url: Option<String>,
        parse_result_url: Option<String>,
    },
    Failed {
        message: String,
    },
}

impl TaskStatus {
    /// Interpret the `result` object of a query response.
    pub fn from_result(result: &Value) -> Self {
        let text = |key: &str| {
            result
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        match result.get("status").and_then(Value::as_str).unwrap_or("") {
            "success" => TaskStatus::Success {
                markdown_url: text("markdown_url"),
                parse_result_url: text("parse_result_url"),
            },
            "failed" => TaskStatus::Failed {
                message: text("task_error").unwrap_or_default(),
            },
            "running" | "processing" => TaskStatus::Running,
            _ => TaskStatus::Pending,
        }
    }

    /// Short label passed to progress observers.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success { .. } => "success",
            TaskStatus::Failed { .. } => "failed",
        }
    }
}

/// Result locations of a successful task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub markdown_url: Option<String>,
    pub parse_result_url: Option<String>,
}

/// Lifecycle of one remote task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Submitted { task_id: String },
    Polling { task_id: String, elapsed: Duration },
    Succeeded(TaskOutcome),
    Failed { task_id: String, message: String },
    TimedOut { task_id: String, waited: Duration },
}

impl TaskState {
    /// Advance on one status observed `elapsed` after submission.
    ///
    /// Terminal states absorb every further observation. A failure without a
    /// message still fails, as `"unknown error"`.
    pub fn transition(self, status: TaskStatus, elapsed: Duration, policy: &PollPolicy) -> TaskState {
        let task_id = match self {
            TaskState::Submitted { task_id } | TaskState::Polling { task_id, .. } => task_id,
            terminal => return terminal,
        };

        match status {
            TaskStatus::Success {
                markdown_url,
                parse_result_url,
            } => TaskState::Succeeded(TaskOutcome {
                task_id,
                markdown_url,
                parse_result_url,
            }),
            TaskStatus::Failed { message } => TaskState::Failed {
                task_id,
                message: if message.trim().is_empty() {
                    "unknown error".to_string()
                } else {
                    message
                },
            },
            TaskStatus::Pending | TaskStatus::Running => {
                if elapsed >= policy.max_wait {
                    TaskState::TimedOut {
                        task_id,
                        waited: elapsed,
                    }
                } else {
                    TaskState::Polling { task_id, elapsed }
                }
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded(_) | TaskState::Failed { .. } | TaskState::TimedOut { .. }
        )
    }

    /// Wait budget consumed at the last observation.
    pub fn elapsed(&self) -> Duration {
        match self {
            TaskState::Polling { elapsed, .. } => *elapsed,
            TaskState::TimedOut { waited, .. } => *waited,
            _ => Duration::ZERO,
        }
    }
}

// ── Backend seam ─────────────────────────────────────────────────────────────

/// An asynchronous document-parsing service.
#[allow(async_fn_in_trait)]
pub trait DocumentParser {
    /// Submit a document; returns the task id.
    async fn submit(&self, document: &[u8], file_name: &str) -> Result<String, ConvertError>;

    /// Observe the task's current status.
    async fn query(&self, task_id: &str) -> Result<TaskStatus, ConvertError>;

    /// Download a result artifact as text.
    async fn fetch_text(&self, url: &str) -> Result<String, ConvertError>;

    /// Synchronous text recognition of a single image, one line per entry.
    async fn recognize_image(&self, image: &[u8]) -> Result<String, ConvertError>;
}

/// A finished task and the number of status queries it took.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub outcome: TaskOutcome,
    pub polls: u32,
}

/// Submit `document` and poll until the task reaches a terminal state.
///
/// Submission and query errors abort immediately; only non-terminal
/// statuses are retried. Neither the sleeps nor a slow query can hold the
/// caller past `policy.max_wait`.
pub async fn run_task<P: DocumentParser>(
    parser: &P,
    document: &[u8],
    file_name: &str,
    policy: &PollPolicy,
    progress: Option<&ProgressCallback>,
) -> Result<TaskRun, ConvertError> {
    let task_id = parser.submit(document, file_name).await?;
    info!("Submitted parse task {task_id} for {file_name}");
    if let Some(cb) = progress {
        cb.on_task_submitted(&task_id);
    }

    let started = Instant::now();
    let mut state = TaskState::Submitted {
        task_id: task_id.clone(),
    };
    let mut polls = 0u32;

    loop {
        if matches!(state, TaskState::Polling { .. }) {
            let remaining = policy.max_wait.saturating_sub(started.elapsed());
            tokio::time::sleep(policy.interval.min(remaining)).await;
        }

        let remaining = policy.max_wait.saturating_sub(started.elapsed());
        let status = match tokio::time::timeout(remaining, parser.query(&task_id)).await {
            Ok(status) => status?,
            Err(_) => {
                let waited = started.elapsed();
                warn!("Task {task_id} status query still pending after {:?}", waited);
                return Err(ConvertError::RemoteTimeout { task_id, waited });
            }
        };
        polls += 1;
        let elapsed = started.elapsed();
        debug!("Task {task_id} poll #{polls} at {:?}: {}", elapsed, status.label());
        if let Some(cb) = progress {
            cb.on_poll(&task_id, elapsed.as_secs(), status.label());
        }

        state = match state.transition(status, elapsed, policy) {
            TaskState::Succeeded(outcome) => {
                info!("Task {task_id} succeeded after {polls} poll(s)");
                return Ok(TaskRun { outcome, polls });
            }
            TaskState::Failed { task_id, message } => {
                return Err(ConvertError::RemoteTaskFailed { task_id, message });
            }
            TaskState::TimedOut { task_id, waited } => {
                warn!("Task {task_id} still unfinished after {:?}", waited);
                return Err(ConvertError::RemoteTimeout { task_id, waited });
            }
            pending => pending,
        };
    }
}

/// Download the task's artifacts and assemble a [`RemoteResult`].
///
/// Either download may fail with a warning. Missing or blank markdown is
/// rebuilt from the parse result's page texts; with neither available the
/// conversion has no content.
pub async fn fetch_remote_result<P: DocumentParser>(
    parser: &P,
    outcome: &TaskOutcome,
    input_name: &str,
) -> Result<RemoteResult, ConvertError> {
    let parse_result = match &outcome.parse_result_url {
        Some(url) => match fetch_parse_result(parser, url).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Parse result unavailable: {e}");
                None
            }
        },
        None => None,
    };

    let markdown = match &outcome.markdown_url {
        Some(url) => match parser.fetch_text(url).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Markdown unavailable: {e}");
                None
            }
        },
        None => None,
    };

    let markdown = match markdown.filter(|m| !m.trim().is_empty()) {
        Some(md) => md,
        None => {
            let rebuilt = parse_result
                .as_ref()
                .map(ParseResult::joined_text)
                .unwrap_or_default();
            if rebuilt.is_empty() {
                return Err(ConvertError::NoContent {
                    input: input_name.to_string(),
                });
            }
            info!("Markdown rebuilt from {} page text(s)", parse_result.as_ref().map_or(0, |p| p.pages.len()));
            rebuilt
        }
    };

    Ok(RemoteResult {
        markdown,
        parse_result,
    })
}

async fn fetch_parse_result<P: DocumentParser>(
    parser: &P,
    url: &str,
) -> Result<ParseResult, ConvertError> {
    let body = parser.fetch_text(url).await?;
    serde_json::from_str(&body).map_err(|e| ConvertError::DownloadFailed {
        url: url.to_string(),
        reason: format!("invalid parse result JSON: {e}"),
    })
}

// ── Baidu implementation ─────────────────────────────────────────────────────

/// The Baidu AI Cloud document parser and general OCR endpoints.
///
/// Requests are form-encoded with an OAuth access token (client-credentials
/// grant) in the query string. The token is fetched once per instance.
#[derive(Debug)]
pub struct BaiduParser {
    client: reqwest::Client,
    api_base: String,
    credentials: Credentials,
    token: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl BaiduParser {
    pub fn new(
        api_base: impl Into<String>,
        credentials: Credentials,
        timeout_secs: u64,
    ) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
            token: OnceCell::new(),
        })
    }

    async fn access_token(&self) -> Result<&str, ConvertError> {
        let token = self.token.get_or_try_init(|| self.request_token()).await?;
        Ok(token.as_str())
    }

    async fn request_token(&self) -> Result<String, ConvertError> {
        let url = format!("{}{}", self.api_base, TOKEN_PATH);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.api_key.as_str()),
                ("client_secret", self.credentials.secret_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ConvertError::AuthFailed {
                detail: e.to_string(),
            })?;
        let status = response.status();
        let body: TokenResponse = response.json().await.map_err(|e| ConvertError::AuthFailed {
            detail: format!("HTTP {status}: {e}"),
        })?;
        match body.access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                debug!("Obtained remote access token");
                Ok(token)
            }
            None => Err(ConvertError::AuthFailed {
                detail: body
                    .error_description
                    .or(body.error)
                    .unwrap_or_else(|| format!("HTTP {status}, no access_token in response")),
            }),
        }
    }

    /// POST a form to `path` and return the parsed JSON body.
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, String> {
        let token = self.access_token().await.map_err(|e| e.to_string())?;
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status} - {}", body.trim()));
        }
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        check_envelope(&body)?;
        Ok(body)
    }
}

/// Reject responses carrying a non-zero `error_code`.
fn check_envelope(body: &Value) -> Result<(), String> {
    let failed = match body.get("error_code") {
        None | Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(_) => true,
    };
    if failed {
        let code = body.get("error_code").map(Value::to_string).unwrap_or_default();
        let msg = body.get("error_msg").and_then(Value::as_str).unwrap_or("");
        return Err(format!("API error {code}: {msg}"));
    }
    Ok(())
}

impl DocumentParser for BaiduParser {
    async fn submit(&self, document: &[u8], file_name: &str) -> Result<String, ConvertError> {
        self.access_token().await?;
        let data = encode_bytes(document);
        let body = self
            .post_form(SUBMIT_PATH, &[("file_data", data.as_str()), ("file_name", file_name)])
            .await
            .map_err(|detail| ConvertError::SubmitFailed { detail })?;
        body.pointer("/result/task_id")
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| ConvertError::SubmitFailed {
                detail: "response has no task_id".into(),
            })
    }

    async fn query(&self, task_id: &str) -> Result<TaskStatus, ConvertError> {
        let body = self
            .post_form(QUERY_PATH, &[("task_id", task_id)])
            .await
            .map_err(|detail| ConvertError::QueryFailed {
                task_id: task_id.to_string(),
                detail,
            })?;
        Ok(TaskStatus::from_result(
            body.get("result").unwrap_or(&Value::Null),
        ))
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ConvertError> {
        let failed = |reason: String| ConvertError::DownloadFailed {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        response.text().await.map_err(|e| failed(e.to_string()))
    }

    async fn recognize_image(&self, image: &[u8]) -> Result<String, ConvertError> {
        self.access_token().await?;
        let data = encode_bytes(image);
        let body = self
            .post_form(
                GENERAL_OCR_PATH,
                &[
                    ("image", data.as_str()),
                    ("language_type", "CHN_ENG"),
                    ("detect_direction", "true"),
                    ("paragraph", "true"),
                ],
            )
            .await
            .map_err(|detail| ConvertError::ToolFailed {
                tool: "remote OCR".into(),
                diagnostics: detail,
            })?;
        let lines: Vec<&str> = body
            .get("words_result")
            .and_then(Value::as_array)
            .map(|words| {
                words
                    .iter()
                    .filter_map(|w| w.get("words").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        debug!("Remote OCR returned {} line(s)", lines.len());
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn policy(interval_ms: u64, max_wait_ms: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(interval_ms),
            max_wait: Duration::from_millis(max_wait_ms),
        }
    }

    fn success() -> TaskStatus {
        TaskStatus::Success {
            markdown_url: Some("https://bos.example.com/t.md".into()),
            parse_result_url: Some("https://bos.example.com/t.json".into()),
        }
    }

    /// Scripted parser: statuses are served in order, the last one repeats.
    #[derive(Default)]
    struct ScriptedParser {
        submit_error: bool,
        statuses: Mutex<VecDeque<TaskStatus>>,
        queries: Mutex<u32>,
        texts: Vec<(&'static str, &'static str)>,
    }

    impl ScriptedParser {
        fn with_statuses(statuses: Vec<TaskStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Default::default()
            }
        }
    }

    impl DocumentParser for ScriptedParser {
        async fn submit(&self, _document: &[u8], _file_name: &str) -> Result<String, ConvertError> {
            if self.submit_error {
                return Err(ConvertError::AuthFailed {
                    detail: "invalid client".into(),
                });
            }
            Ok("task-1".into())
        }

        async fn query(&self, _task_id: &str) -> Result<TaskStatus, ConvertError> {
            *self.queries.lock().unwrap() += 1;
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            Ok(status.unwrap_or(TaskStatus::Pending))
        }

        async fn fetch_text(&self, url: &str) -> Result<String, ConvertError> {
            self.texts
                .iter()
                .find(|(u, _)| *u == url)
                .map(|(_, body)| body.to_string())
                .ok_or_else(|| ConvertError::DownloadFailed {
                    url: url.into(),
                    reason: "HTTP 404".into(),
                })
        }

        async fn recognize_image(&self, _image: &[u8]) -> Result<String, ConvertError> {
            Ok(String::new())
        }
    }

    #[test]
    fn status_from_query_result() {
        assert_eq!(
            TaskStatus::from_result(&json!({"status": "success", "markdown_url": "u", "parse_result_url": ""})),
            TaskStatus::Success {
                markdown_url: Some("u".into()),
                parse_result_url: None
            }
        );
        assert_eq!(
            TaskStatus::from_result(&json!({"status": "failed"})),
            TaskStatus::Failed { message: String::new() }
        );
        assert_eq!(TaskStatus::from_result(&json!({"status": "running"})), TaskStatus::Running);
        assert_eq!(TaskStatus::from_result(&Value::Null), TaskStatus::Pending);
    }

    #[test]
    fn transition_times_out_once_budget_is_spent() {
        let p = policy(5, 15);
        let ms = Duration::from_millis;
        let s = TaskState::Submitted { task_id: "t".into() };
        let s = s.transition(TaskStatus::Pending, ms(3), &p);
        assert_eq!(s.elapsed(), ms(3));
        let s = s.transition(TaskStatus::Running, ms(14), &p);
        assert_eq!(s.elapsed(), ms(14));
        let s = s.transition(TaskStatus::Running, ms(40), &p);
        assert_eq!(
            s,
            TaskState::TimedOut {
                task_id: "t".into(),
                waited: ms(40)
            }
        );
        assert!(s.is_terminal());
    }

    #[test]
    fn terminal_states_absorb_observations() {
        let p = policy(5, 15);
        let failed = TaskState::Failed {
            task_id: "t".into(),
            message: "boom".into(),
        };
        assert_eq!(failed.clone().transition(success(), Duration::ZERO, &p), failed);
    }

    #[test]
    fn failure_without_message_is_unknown_error() {
        let s = TaskState::Submitted { task_id: "t".into() }.transition(
            TaskStatus::Failed {
                message: "  ".into(),
            },
            Duration::ZERO,
            &policy(5, 15),
        );
        assert_eq!(
            s,
            TaskState::Failed {
                task_id: "t".into(),
                message: "unknown error".into()
            }
        );
    }

    #[tokio::test]
    async fn succeeds_after_pending_polls() {
        let parser = ScriptedParser::with_statuses(vec![
            TaskStatus::Pending,
            TaskStatus::Running,
            success(),
        ]);
        let run = run_task(&parser, b"%PDF", "a.pdf", &policy(1, 1000), None)
            .await
            .unwrap();
        assert_eq!(run.polls, 3);
        assert_eq!(run.outcome.task_id, "task-1");
    }

    #[tokio::test(start_paused = true)]
    async fn never_terminal_times_out() {
        let parser = ScriptedParser::with_statuses(vec![TaskStatus::Running]);
        let err = run_task(&parser, b"%PDF", "a.pdf", &policy(1, 5), None)
            .await
            .unwrap_err();
        match err {
            ConvertError::RemoteTimeout { task_id, waited } => {
                assert_eq!(task_id, "task-1");
                assert_eq!(waited, Duration::from_millis(5));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(*parser.queries.lock().unwrap() >= 5);
    }

    /// Every status query takes `delay` and reports `Running`.
    struct SlowParser {
        delay: Duration,
        queries: Mutex<u32>,
    }

    impl DocumentParser for SlowParser {
        async fn submit(&self, _document: &[u8], _file_name: &str) -> Result<String, ConvertError> {
            Ok("task-slow".into())
        }

        async fn query(&self, _task_id: &str) -> Result<TaskStatus, ConvertError> {
            *self.queries.lock().unwrap() += 1;
            tokio::time::sleep(self.delay).await;
            Ok(TaskStatus::Running)
        }

        async fn fetch_text(&self, url: &str) -> Result<String, ConvertError> {
            Err(ConvertError::DownloadFailed {
                url: url.into(),
                reason: "unused".into(),
            })
        }

        async fn recognize_image(&self, _image: &[u8]) -> Result<String, ConvertError> {
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_query_is_cut_off_at_the_budget() {
        let parser = SlowParser {
            delay: Duration::from_millis(200),
            queries: Mutex::new(0),
        };
        let started = tokio::time::Instant::now();
        let err = run_task(&parser, b"%PDF", "a.pdf", &policy(10, 100), None)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(200));
        match err {
            ConvertError::RemoteTimeout { task_id, waited } => {
                assert_eq!(task_id, "task-slow");
                assert_eq!(waited, Duration::from_millis(100));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*parser.queries.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_queries_count_against_the_budget() {
        let parser = SlowParser {
            delay: Duration::from_millis(40),
            queries: Mutex::new(0),
        };
        let started = tokio::time::Instant::now();
        let err = run_task(&parser, b"%PDF", "a.pdf", &policy(10, 100), None)
            .await
            .unwrap_err();

        // 0–40 query, 50–90 query, 100 budget spent mid-query.
        assert!(matches!(err, ConvertError::RemoteTimeout { .. }), "{err}");
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(*parser.queries.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_with_empty_message_is_an_error() {
        let parser = ScriptedParser::with_statuses(vec![TaskStatus::Failed {
            message: String::new(),
        }]);
        let err = run_task(&parser, b"%PDF", "a.pdf", &policy(1, 100), None)
            .await
            .unwrap_err();
        match err {
            ConvertError::RemoteTaskFailed { task_id, message } => {
                assert_eq!(task_id, "task-1");
                assert_eq!(message, "unknown error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn submit_failure_skips_polling() {
        let parser = ScriptedParser {
            submit_error: true,
            ..Default::default()
        };
        let err = run_task(&parser, b"%PDF", "a.pdf", &policy(1, 100), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::AuthFailed { .. }));
        assert_eq!(*parser.queries.lock().unwrap(), 0);
    }

    fn outcome() -> TaskOutcome {
        TaskOutcome {
            task_id: "task-1".into(),
            markdown_url: Some("https://bos.example.com/t.md".into()),
            parse_result_url: Some("https://bos.example.com/t.json".into()),
        }
    }

    #[tokio::test]
    async fn blank_markdown_is_rebuilt_from_pages() {
        let parser = ScriptedParser {
            texts: vec![
                ("https://bos.example.com/t.md", "  \n"),
                (
                    "https://bos.example.com/t.json",
                    r#"{"pages":[{"page_num":2,"text":"two"},{"page_num":1,"text":"one"}]}"#,
                ),
            ],
            ..Default::default()
        };
        let result = fetch_remote_result(&parser, &outcome(), "a.pdf").await.unwrap();
        assert_eq!(result.markdown, "one\n\ntwo");
        assert_eq!(result.parse_result.unwrap().pages.len(), 2);
    }

    #[tokio::test]
    async fn missing_parse_result_keeps_markdown() {
        let parser = ScriptedParser {
            texts: vec![("https://bos.example.com/t.md", "# Doc\n")],
            ..Default::default()
        };
        let result = fetch_remote_result(&parser, &outcome(), "a.pdf").await.unwrap();
        assert_eq!(result.markdown, "# Doc\n");
        assert!(result.parse_result.is_none());
    }

    #[tokio::test]
    async fn nothing_downloadable_is_no_content() {
        let parser = ScriptedParser::default();
        let err = fetch_remote_result(&parser, &outcome(), "a.pdf").await.unwrap_err();
        assert!(matches!(err, ConvertError::NoContent { .. }));
    }

    #[test]
    fn envelope_error_codes() {
        assert!(check_envelope(&json!({"result": {}})).is_ok());
        assert!(check_envelope(&json!({"error_code": 0})).is_ok());
        let err = check_envelope(&json!({"error_code": 110, "error_msg": "Access token invalid"}))
            .unwrap_err();
        assert!(err.contains("110") && err.contains("Access token invalid"), "{err}");
    }

    // ── BaiduParser against a local HTTP responder ──────────────────────────

    mod http {
        use super::*;
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve canned JSON bodies keyed by request path; records request
        /// lines and bodies.
        async fn serve(routes: Vec<(&'static str, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            let log = Arc::new(Mutex::new(Vec::new()));
            let seen = log.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut sock, _)) = listener.accept().await else {
                        return;
                    };
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let (head_end, content_length) = loop {
                        let n = sock.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break (buf.len(), 0);
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                            let len = head
                                .lines()
                                .find_map(|l| l.strip_prefix("content-length:"))
                                .and_then(|v| v.trim().parse::<usize>().ok())
                                .unwrap_or(0);
                            break (pos + 4, len);
                        }
                    };
                    while buf.len() < head_end + content_length {
                        let n = sock.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    let request = String::from_utf8_lossy(&buf).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .split('?')
                        .next()
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(request);
                    let body = routes
                        .iter()
                        .find(|(p, _)| *p == path)
                        .map(|(_, b)| b.clone())
                        .unwrap_or_else(|| r#"{"error_code":404,"error_msg":"no route"}"#.into());
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(reply.as_bytes()).await;
                    let _ = sock.shutdown().await;
                }
            });
            (base, log)
        }

        fn creds() -> Credentials {
            Credentials {
                api_key: "ak".into(),
                secret_key: "sk".into(),
            }
        }

        #[tokio::test]
        async fn submit_and_query_round_trip() {
            let (base, log) = serve(vec![
                (TOKEN_PATH, r#"{"access_token":"tok-1","expires_in":2592000}"#.into()),
                (SUBMIT_PATH, r#"{"error_code":0,"result":{"task_id":"task-abc"}}"#.into()),
                (
                    QUERY_PATH,
                    r#"{"result":{"status":"success","markdown_url":"https://bos/x.md","parse_result_url":"https://bos/x.json"}}"#.into(),
                ),
            ])
            .await;
            let parser = BaiduParser::new(base, creds(), 10).unwrap();

            let task_id = parser.submit(b"%PDF-1.7", "doc.pdf").await.unwrap();
            assert_eq!(task_id, "task-abc");
            let status = parser.query(&task_id).await.unwrap();
            assert_eq!(status.label(), "success");

            let requests = log.lock().unwrap().clone();
            // Token fetched once and reused.
            assert_eq!(requests.iter().filter(|r| r.contains(TOKEN_PATH)).count(), 1);
            let submit = requests.iter().find(|r| r.contains(SUBMIT_PATH)).unwrap();
            assert!(submit.contains("access_token=tok-1"));
            assert!(submit.contains("file_name=doc.pdf"));
            assert!(submit.contains(&format!("file_data={}", "JVBERi0xLjc%3D")));
        }

        #[tokio::test]
        async fn token_error_is_auth_failure() {
            let (base, _) = serve(vec![(
                TOKEN_PATH,
                r#"{"error":"invalid_client","error_description":"unknown client id"}"#.into(),
            )])
            .await;
            let parser = BaiduParser::new(base, creds(), 10).unwrap();
            let err = parser.submit(b"x", "a.pdf").await.unwrap_err();
            match err {
                ConvertError::AuthFailed { detail } => assert_eq!(detail, "unknown client id"),
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn api_error_envelope_fails_submission() {
            let (base, _) = serve(vec![
                (TOKEN_PATH, r#"{"access_token":"t"}"#.into()),
                (SUBMIT_PATH, r#"{"error_code":17,"error_msg":"Open api daily request limit reached"}"#.into()),
            ])
            .await;
            let parser = BaiduParser::new(base, creds(), 10).unwrap();
            let err = parser.submit(b"x", "a.pdf").await.unwrap_err();
            assert!(matches!(err, ConvertError::SubmitFailed { .. }));
            assert!(err.to_string().contains("daily request limit"));
        }

        #[tokio::test]
        async fn general_ocr_joins_word_lines() {
            let (base, _) = serve(vec![
                (TOKEN_PATH, r#"{"access_token":"t"}"#.into()),
                (
                    GENERAL_OCR_PATH,
                    r#"{"words_result":[{"words":"标题"},{"words":"正文。"}],"words_result_num":2}"#.into(),
                ),
            ])
            .await;
            let parser = BaiduParser::new(base, creds(), 10).unwrap();
            assert_eq!(parser.recognize_image(b"png").await.unwrap(), "标题\n正文。");
        }
    }
}
