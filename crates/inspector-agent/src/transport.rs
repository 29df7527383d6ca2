//! Process adapter: run an agent CLI and stream its output as frames

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use inspector_stream::{
    AgentEvent, Channel, EventDecoder, FrameSink, FrameStream, MessageMetadata, MetadataPatch,
    StreamFrame,
};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::conversation::{ConversationMessage, extract_last_user_text};
use crate::error::{Error, Result};
use crate::handle::RunHandle;

/// Agent binary invoked when none is configured
pub const DEFAULT_PROGRAM: &str = "cursor-agent";

/// Base arguments: print mode, auto-approve, JSON-lines output
pub const DEFAULT_ARGS: &[&str] = &[
    "-p",
    "--force",
    "--model",
    "gpt-5",
    "--output-format",
    "stream-json",
];

pub const STREAM_PARTIAL_OUTPUT_FLAG: &str = "--stream-partial-output";

/// Environment variable the agent authenticates with
pub const DEFAULT_API_KEY_ENV: &str = "CURSOR_API_KEY";

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How long to keep draining pipes after a kill before giving up on them
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Inputs of one invocation
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Prior turns; only the newest user text is passed to the agent
    pub messages: Vec<ConversationMessage>,
    pub cwd: Option<PathBuf>,
    /// Overlay on the inherited environment
    pub env: HashMap<String, String>,
    /// Replaces the configured default arguments
    pub args: Option<Vec<String>>,
}

impl RunRequest {
    pub fn new(messages: Vec<ConversationMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Some(args);
        self
    }
}

/// How the agent process is launched
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub program: String,
    pub default_args: Vec<String>,
    /// Pass [`STREAM_PARTIAL_OUTPUT_FLAG`] before the prompt
    pub stream_partial_output: bool,
    /// Warn before spawning when this variable is unset
    pub api_key_env: Option<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            default_args: DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect(),
            stream_partial_output: true,
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
        }
    }
}

/// Append the prompt (and the partial-output flag) to the base arguments
pub fn build_args(base: &[String], last_user_text: Option<&str>, stream_partial_output: bool) -> Vec<String> {
    let mut args = base.to_vec();
    let Some(text) = last_user_text.filter(|text| !text.is_empty()) else {
        return args;
    };
    if stream_partial_output {
        args.push(STREAM_PARTIAL_OUTPUT_FLAG.to_string());
    }
    args.push(text.to_string());
    args
}

/// Value of `--model` (either `--model X` or `--model=X`)
pub fn model_from_args(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--model" {
            return iter.next().cloned();
        }
        if let Some(model) = arg.strip_prefix("--model=") {
            return Some(model.to_string());
        }
    }
    None
}

/// Transport for running agent invocations
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run one invocation, writing frames to `sink`.
    ///
    /// Always writes exactly one `finish` frame, last, and returns the
    /// metadata it carried.
    async fn run(&self, request: RunRequest, sink: &mut dyn FrameSink, handle: RunHandle) -> MessageMetadata;
}

/// Serializes outbound frames for one invocation
struct FrameWriter<'a> {
    sink: &'a mut dyn FrameSink,
    metadata: MessageMetadata,
    started: bool,
    next_event: u64,
    /// Events decoded from the process itself
    agent_events: usize,
}

impl<'a> FrameWriter<'a> {
    fn new(sink: &'a mut dyn FrameSink, metadata: MessageMetadata) -> Self {
        Self {
            sink,
            metadata,
            started: false,
            next_event: 0,
            agent_events: 0,
        }
    }

    fn ensure_start(&mut self) {
        if !self.started {
            self.started = true;
            self.sink.write(StreamFrame::Start {
                message_metadata: self.metadata.clone(),
            });
        }
    }

    fn update_metadata(&mut self, patch: MetadataPatch) {
        if self.metadata.apply(patch) {
            self.ensure_start();
            self.sink.write(StreamFrame::MessageMetadata {
                message_metadata: self.metadata.clone(),
            });
        }
    }

    fn emit(&mut self, event: AgentEvent) {
        self.ensure_start();
        let id = format!("event-{}", self.next_event);
        self.next_event += 1;
        self.sink.write(StreamFrame::AgentEvent { id, data: event });
    }

    /// Emit an event decoded from the process, patching metadata from it
    fn forward(&mut self, event: AgentEvent) {
        self.agent_events += 1;
        let run_id = match &event {
            // Raw output lines carry no run identity
            AgentEvent::Log(_) if event.explicit_run_id().is_none() => None,
            _ => Some(event.run_id().to_string()),
        };
        let model = match &event {
            AgentEvent::System(system) => system.model.clone().filter(|model| !model.is_empty()),
            _ => None,
        };
        self.update_metadata(MetadataPatch { run_id, model });
        self.emit(event);
    }

    fn finish(mut self, exit_code: Option<i32>, cancelled: bool) -> MessageMetadata {
        self.ensure_start();
        self.metadata.finished_at = Some(chrono::Utc::now().timestamp_millis());
        self.metadata.exit_code = exit_code;
        self.metadata.cancelled = cancelled;
        self.sink.write(StreamFrame::Finish {
            message_metadata: self.metadata.clone(),
        });
        self.metadata
    }
}

/// How the child process ended
#[derive(Debug, Clone, Copy)]
struct ExitSummary {
    code: Option<i32>,
    success: bool,
    cancelled: bool,
}

impl ExitSummary {
    fn from_status(status: ExitStatus, cancelled: bool) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
            cancelled,
        }
    }

    /// Diagnostic for a failed exit that produced no agent output
    fn failure_notice(&self, program: &str, agent_events: usize) -> Option<String> {
        if self.success || self.cancelled || agent_events > 0 {
            return None;
        }
        Some(match self.code {
            Some(code) => format!("{} exited with status {}", program, code),
            None => format!("{} was terminated by a signal", program),
        })
    }
}

/// Runs the agent as a local child process
#[derive(Debug, Clone, Default)]
pub struct ProcessTransport {
    config: ProcessConfig,
}

impl ProcessTransport {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Run on a spawned task and yield frames as they are produced.
    ///
    /// The stream ends after the `finish` frame.
    pub fn stream(&self, request: RunRequest, handle: RunHandle) -> FrameStream {
        let transport = self.clone();
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StreamFrame>();
        tokio::spawn(async move {
            transport.run(request, &mut tx, handle).await;
        });

        Box::pin(stream! {
            while let Some(frame) = rx.recv().await {
                let terminal = frame.is_terminal();
                yield frame;
                if terminal {
                    break;
                }
            }
        })
    }

    /// Warning shown when the agent's API key is missing
    fn preflight(&self, request: &RunRequest) -> Option<String> {
        let name = self
            .config
            .api_key_env
            .as_deref()
            .filter(|name| !name.is_empty())?;
        let in_overlay = request.env.get(name).is_some_and(|value| !value.is_empty());
        let in_process = std::env::var(name).is_ok_and(|value| !value.is_empty());
        if in_overlay || in_process {
            return None;
        }
        Some(format!(
            "Warning: {} is not set; {} may fail to authenticate",
            name, self.config.program
        ))
    }

    fn command(&self, request: &RunRequest, args: &[String]) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(args)
            .envs(&request.env)
            .env("FORCE_COLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        command
    }

    async fn execute(
        &self,
        request: &RunRequest,
        args: &[String],
        writer: &mut FrameWriter<'_>,
        handle: &RunHandle,
    ) -> Result<ExitSummary> {
        let mut child = self
            .command(request, args)
            .spawn()
            .map_err(|source| inspector_stream::Error::spawn(&self.config.program, source))?;
        handle.mark_running(child.id());
        tracing::info!(
            run = %handle.id(),
            program = %self.config.program,
            pid = ?child.id(),
            "agent process started"
        );

        let cancelled = drain(&mut child, writer, handle).await?;
        let status = child.wait().await?;
        tracing::info!(run = %handle.id(), %status, cancelled, "agent process exited");
        Ok(ExitSummary::from_status(status, cancelled))
    }
}

/// Read both pipes until they close, forwarding decoded events.
///
/// Returns whether the child was killed because of cancellation.
async fn drain(child: &mut Child, writer: &mut FrameWriter<'_>, handle: &RunHandle) -> Result<bool> {
    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(Error::Other("agent process pipes were not captured".to_string()));
    };

    let token = handle.token();
    let mut decoder = EventDecoder::new();
    let mut stdout_buf = vec![0u8; READ_BUFFER_SIZE];
    let mut stderr_buf = vec![0u8; READ_BUFFER_SIZE];
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut cancelled = false;
    let mut drain_deadline: Option<tokio::time::Instant> = None;

    while stdout_open || stderr_open {
        tokio::select! {
            _ = token.cancelled(), if !cancelled => {
                cancelled = true;
                drain_deadline = Some(tokio::time::Instant::now() + CANCEL_GRACE);
                tracing::info!(run = %handle.id(), "cancelling agent process");
                if let Err(e) = child.start_kill() {
                    tracing::warn!("Failed to kill agent process: {}", e);
                }
            }
            _ = tokio::time::sleep_until(drain_deadline.unwrap_or_else(tokio::time::Instant::now)), if drain_deadline.is_some() => {
                tracing::warn!(run = %handle.id(), "agent pipes still open after kill; abandoning them");
                break;
            }
            read = stdout.read(&mut stdout_buf), if stdout_open => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        for event in decoder.push(Channel::Primary, &stdout_buf[..n]) {
                            writer.forward(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Stdout read error: {}", e);
                        stdout_open = false;
                    }
                }
            }
            read = stderr.read(&mut stderr_buf), if stderr_open => {
                match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => {
                        for event in decoder.push(Channel::Diagnostic, &stderr_buf[..n]) {
                            writer.forward(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Stderr read error: {}", e);
                        stderr_open = false;
                    }
                }
            }
        }
    }

    for event in decoder.finish() {
        writer.forward(event);
    }
    Ok(cancelled)
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn run(&self, request: RunRequest, sink: &mut dyn FrameSink, handle: RunHandle) -> MessageMetadata {
        let base = request
            .args
            .as_deref()
            .unwrap_or(self.config.default_args.as_slice());
        let args = build_args(
            base,
            extract_last_user_text(&request.messages),
            self.config.stream_partial_output,
        );

        let mut metadata = MessageMetadata::new();
        metadata.model = model_from_args(&args);
        let mut writer = FrameWriter::new(sink, metadata);

        if let Some(warning) = self.preflight(&request) {
            tracing::warn!("{}", warning);
            writer.emit(AgentEvent::system(warning));
        }

        let outcome = if handle.is_cancelled() {
            tracing::info!(run = %handle.id(), "run cancelled before spawn");
            Ok(ExitSummary {
                code: None,
                success: false,
                cancelled: true,
            })
        } else {
            self.execute(&request, &args, &mut writer, &handle).await
        };

        let (exit_code, cancelled) = match outcome {
            Ok(exit) => {
                if let Some(notice) = exit.failure_notice(&self.config.program, writer.agent_events) {
                    writer.emit(AgentEvent::log(notice, Channel::Diagnostic));
                }
                (exit.code, exit.cancelled)
            }
            Err(e) => {
                if e.is_program_missing() {
                    tracing::warn!("{} is not installed or not on PATH", self.config.program);
                } else {
                    tracing::warn!("Agent run failed: {}", e);
                }
                writer.emit(AgentEvent::log(e.to_string(), Channel::Diagnostic));
                (None, handle.is_cancelled())
            }
        };

        let metadata = writer.finish(exit_code, cancelled);
        handle.mark_finished(exit_code, cancelled);
        metadata
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures::StreamExt;
    use inspector_stream::{DEFAULT_RUN_ID, collect_agent_events};

    /// Transport running `script` under `sh -c`; the prompt arrives as `$2`
    fn sh(script: &str) -> ProcessTransport {
        ProcessTransport::new(ProcessConfig {
            program: "sh".into(),
            default_args: vec!["-c".into(), script.into(), "agent".into()],
            stream_partial_output: true,
            api_key_env: None,
        })
    }

    async fn run_frames(transport: &ProcessTransport, request: RunRequest) -> (Vec<StreamFrame>, MessageMetadata) {
        let mut frames: Vec<StreamFrame> = Vec::new();
        let metadata = transport.run(request, &mut frames, RunHandle::new()).await;
        (frames, metadata)
    }

    fn count(frames: &[StreamFrame], predicate: impl Fn(&StreamFrame) -> bool) -> usize {
        frames.iter().filter(|frame| predicate(frame)).count()
    }

    fn log_texts(frames: &[StreamFrame]) -> Vec<String> {
        collect_agent_events(frames)
            .into_iter()
            .filter_map(|event| match event {
                AgentEvent::Log(log) => log.text,
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_build_args() {
        let base: Vec<String> = DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect();
        assert_eq!(build_args(&base, None, true), base);
        assert_eq!(build_args(&base, Some(""), true), base);

        let args = build_args(&base, Some("fix the bug"), true);
        assert_eq!(&args[base.len()..], &["--stream-partial-output", "fix the bug"]);

        let args = build_args(&base, Some("hi"), false);
        assert_eq!(args.last().map(String::as_str), Some("hi"));
        assert_eq!(args.len(), base.len() + 1);
    }

    #[test]
    fn test_model_from_args() {
        let args: Vec<String> = DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect();
        assert_eq!(model_from_args(&args).as_deref(), Some("gpt-5"));
        assert_eq!(model_from_args(&["--model=sonnet".to_string()]).as_deref(), Some("sonnet"));
        assert_eq!(model_from_args(&["--model".to_string()]), None);
        assert_eq!(model_from_args(&[]), None);
    }

    #[tokio::test]
    async fn test_framing_order() {
        let script = r#"
printf '%s\n' '{"type":"system","subtype":"init","model":"gpt-5-fast","session_id":"s1","message":"ready"}'
printf '%s\n' '{"type":"assistant","session_id":"s1","message":{"content":[{"type":"text","text":"Hi"}]}}'
echo 'plain stderr' >&2
printf '%s\n' '{"type":"result","session_id":"s1"}'
"#;
        let (frames, metadata) = run_frames(&sh(script), RunRequest::default()).await;

        assert!(matches!(frames.first(), Some(StreamFrame::Start { .. })));
        assert!(frames.last().is_some_and(StreamFrame::is_terminal));
        assert_eq!(count(&frames, |f| matches!(f, StreamFrame::Start { .. })), 1);
        assert_eq!(count(&frames, StreamFrame::is_terminal), 1);

        let ids: Vec<&str> = frames
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::AgentEvent { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["event-0", "event-1", "event-2", "event-3"]);

        // runId and model change together on the init notice
        assert_eq!(count(&frames, |f| matches!(f, StreamFrame::MessageMetadata { .. })), 1);
        assert_eq!(metadata.run_id.as_deref(), Some("s1"));
        assert_eq!(metadata.model.as_deref(), Some("gpt-5-fast"));
        assert_eq!(metadata.exit_code, Some(0));
        assert!(!metadata.cancelled);
        assert!(metadata.finished_at.is_some());

        assert_eq!(log_texts(&frames), vec!["plain stderr".to_string()]);
    }

    #[tokio::test]
    async fn test_sessionless_run_records_default_run_id() {
        let script = r#"
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"Hi"}]}}'
echo 'plain stderr' >&2
"#;
        let (frames, metadata) = run_frames(&sh(script), RunRequest::default()).await;

        let patches: Vec<Option<&str>> = frames
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::MessageMetadata { message_metadata } => Some(message_metadata.run_id.as_deref()),
                _ => None,
            })
            .collect();
        assert_eq!(patches, vec![Some(DEFAULT_RUN_ID)]);
        assert_eq!(metadata.run_id.as_deref(), Some(DEFAULT_RUN_ID));
    }

    #[tokio::test]
    async fn test_spawn_failure_still_finishes() {
        let transport = ProcessTransport::new(ProcessConfig {
            program: "/nonexistent/inspector-agent-binary".into(),
            api_key_env: None,
            ..Default::default()
        });
        let (frames, metadata) = run_frames(&transport, RunRequest::default()).await;

        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], StreamFrame::Start { .. }));
        let events = collect_agent_events(&frames);
        let AgentEvent::Log(log) = &events[0] else {
            panic!("expected log, got {:?}", events[0]);
        };
        assert_eq!(log.subtype.as_deref(), Some("stderr"));
        assert!(log.text.as_deref().unwrap_or("").contains("Failed to spawn"));
        assert!(frames[2].is_terminal());
        assert_eq!(metadata.exit_code, None);
    }

    #[tokio::test]
    async fn test_silent_failure_reports_status() {
        let (frames, metadata) = run_frames(&sh("exit 3"), RunRequest::default()).await;
        assert_eq!(log_texts(&frames), vec!["sh exited with status 3".to_string()]);
        assert_eq!(metadata.exit_code, Some(3));
        assert_eq!(count(&frames, StreamFrame::is_terminal), 1);
    }

    #[tokio::test]
    async fn test_failure_after_output_adds_no_notice() {
        let (frames, metadata) = run_frames(&sh("echo partial; exit 1"), RunRequest::default()).await;
        assert_eq!(log_texts(&frames), vec!["partial".to_string()]);
        assert_eq!(metadata.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_unterminated_line_is_flushed() {
        let script = r#"printf '%s' '{"type":"error","error":"late"}'"#;
        let (frames, _) = run_frames(&sh(script), RunRequest::default()).await;
        let events = collect_agent_events(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "error");
    }

    #[tokio::test]
    async fn test_prompt_and_env_reach_the_process() {
        let script = r#"echo "prompt=$2 flag=$1 color=$FORCE_COLOR extra=$INSPECTOR_TEST_VALUE""#;
        let request = RunRequest::new(vec![ConversationMessage::user("list files")])
            .with_env("INSPECTOR_TEST_VALUE", "42");
        let (frames, _) = run_frames(&sh(script), request).await;
        assert_eq!(
            log_texts(&frames),
            vec!["prompt=list files flag=--stream-partial-output color=1 extra=42".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cwd_is_applied() {
        let dir = std::env::temp_dir();
        let request = RunRequest::default().with_cwd(&dir);
        let (frames, _) = run_frames(&sh("pwd -P"), request).await;
        let expected = dir.canonicalize().unwrap();
        assert_eq!(log_texts(&frames), vec![expected.display().to_string()]);
    }

    #[tokio::test]
    async fn test_missing_api_key_warns_first() {
        let transport = ProcessTransport::new(ProcessConfig {
            api_key_env: Some("INSPECTOR_TEST_UNSET_KEY_7F3A".into()),
            ..sh("true").config
        });
        let (frames, _) = run_frames(&transport, RunRequest::default()).await;
        let events = collect_agent_events(&frames);
        let AgentEvent::System(system) = &events[0] else {
            panic!("expected system warning, got {:?}", events[0]);
        };
        assert!(system.notice().unwrap_or_default().starts_with("Warning:"));

        let request = RunRequest::default().with_env("INSPECTOR_TEST_UNSET_KEY_7F3A", "k");
        let (frames, _) = run_frames(&transport, request).await;
        assert!(collect_agent_events(&frames).is_empty());
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_kills_and_finishes() {
        let transport = sh("echo started; exec sleep 30");
        let handle = RunHandle::new();
        let mut stream = transport.stream(RunRequest::default(), handle.clone());

        let mut frames = Vec::new();
        let collected = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(frame) = stream.next().await {
                if frame.event().is_some() {
                    handle.cancel();
                }
                frames.push(frame);
            }
        })
        .await;
        assert!(collected.is_ok(), "stream did not finish after cancel");

        let finish = frames.last().and_then(StreamFrame::metadata).cloned().unwrap();
        assert!(frames.last().unwrap().is_terminal());
        assert!(finish.cancelled);
        assert_eq!(log_texts(&frames), vec!["started".to_string()]);
        assert!(handle.wait_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_cancel_before_spawn() {
        let handle = RunHandle::new();
        handle.cancel();
        let mut frames: Vec<StreamFrame> = Vec::new();
        let metadata = sh("echo never")
            .run(RunRequest::default(), &mut frames, handle)
            .await;
        assert!(metadata.cancelled);
        assert_eq!(frames.len(), 2);
        assert!(collect_agent_events(&frames).is_empty());
    }
}
