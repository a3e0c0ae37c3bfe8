//! The connection actor and the public [`Connection`] handle.
//!
//! A single background task owns the transport and every piece of mutable
//! connection state — the opening-waiter table, the live-sequence table,
//! and (nested inside each sequence's state) its pending-command table,
//! generation slots, and tool table. All of it is reached exclusively
//! through an unbounded command channel and the transport's own inbound
//! stream — no other code ever touches these tables directly. This keeps
//! "a handler runs to completion before the next frame is processed" true
//! without a single `Mutex`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use indexmap::IndexMap;
use modelsocket_protocol::Cid;
use modelsocket_protocol::GenOpts;
use modelsocket_protocol::InboundEvent;
use modelsocket_protocol::OutboundFrame;
use modelsocket_protocol::SeqCommandData;
use modelsocket_protocol::SeqId;
use modelsocket_protocol::SeqOpenData;
use modelsocket_protocol::ToolResultPayload;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::error::LifecycleError;
use crate::error::ModelSocketError;
use crate::error::Result;
use crate::gen_stream::Chunk;
use crate::sequence::Sequence;
use crate::tool::Tool;
use crate::transport::Transport;
use crate::transport::WebSocketTransport;

/// Options accepted by [`Connection::open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub tools: bool,
    pub tool_prompt: Option<String>,
    pub skip_prelude: Option<bool>,
}

/// One live ModelSocket connection: the transport, the sequence table, and
/// the opening-waiter table, all owned by a background actor task.
pub struct Connection {
    pub(crate) shared: Arc<ConnectionShared>,
}

pub(crate) struct ConnectionShared {
    cmd_tx: mpsc::UnboundedSender<ActorMsg>,
    next_cid: AtomicU64,
}

impl ConnectionShared {
    pub(crate) fn next_cid(&self) -> Cid {
        Cid::new(self.next_cid.fetch_add(1, Ordering::Relaxed).to_string())
    }

    pub(crate) fn send(&self, msg: ActorMsg) -> Result<()> {
        self.cmd_tx
            .send(msg)
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::ConnectionClosed))
    }
}

impl Connection {
    /// Opens the transport and installs the dispatch loop. Attaches
    /// `Authorization: Bearer <secret>` when `MODELSOCKET_API_KEY` is set.
    pub async fn connect(url: &str) -> Result<Self> {
        crate::config::init_logging_from_env();
        let api_key = crate::config::get_api_key();
        let transport = WebSocketTransport::connect(url, api_key.as_deref()).await?;
        Ok(Self::from_transport(Box::new(transport)))
    }

    /// Builds a connection around any [`Transport`] — the production
    /// WebSocket backend, or the in-memory mock used by tests.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_actor(transport, cmd_rx));
        Self {
            shared: Arc::new(ConnectionShared {
                cmd_tx,
                next_cid: AtomicU64::new(0),
            }),
        }
    }

    /// Opens a new sequence for `model` and awaits the server-assigned
    /// `seq_id`.
    pub async fn open(&self, model: impl Into<String>, options: OpenOptions) -> Result<Sequence> {
        let model = model.into();
        let cid = self.shared.next_cid();
        let (respond, rx) = oneshot::channel();
        debug!(%cid, model = %model, "sending seq_open");
        self.shared.send(ActorMsg::Open {
            cid,
            model: model.clone(),
            options: options.clone(),
            respond,
        })?;
        let seq_id = rx
            .await
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::ConnectionClosed))??;
        Ok(Sequence::new(seq_id, model, options.tools, self.shared.clone()))
    }

    /// Number of sequences currently registered on this connection. A
    /// read-only accessor exposing state the engine already tracks.
    pub async fn live_sequence_count(&self) -> Result<usize> {
        let (respond, rx) = oneshot::channel();
        self.shared.send(ActorMsg::LiveSequenceCount { respond })?;
        rx.await
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::ConnectionClosed))
    }

    /// Closes the transport and rejects every outstanding waiter:
    /// `websocket closed by client` for opening waiters, `seq closed` for
    /// every sequence's pending commands.
    pub async fn close(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        if self.shared.send(ActorMsg::Shutdown { ack }).is_ok() {
            let _ = rx.await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Actor-internal state and messages
// ---------------------------------------------------------------------------

pub(crate) enum PendingWaiter {
    Append(oneshot::Sender<Result<()>>),
    /// No caller awaits a `gen` waiter directly (`gen` returns its stream
    /// synchronously) — it exists purely so the pending-command accounting
    /// invariant holds and so `close()` fan-out has something to drain.
    Gen,
    Fork(oneshot::Sender<Result<SeqId>>),
    Close(oneshot::Sender<Result<()>>),
}

fn reject_pending(waiter: PendingWaiter, err: LifecycleError) {
    match waiter {
        PendingWaiter::Append(tx) => {
            let _ = tx.send(Err(ModelSocketError::Lifecycle(err)));
        }
        PendingWaiter::Gen => {}
        PendingWaiter::Fork(tx) => {
            let _ = tx.send(Err(ModelSocketError::Lifecycle(err)));
        }
        PendingWaiter::Close(tx) => {
            let _ = tx.send(Err(ModelSocketError::Lifecycle(err)));
        }
    }
}

struct SequenceState {
    model: String,
    tools_enabled: bool,
    tools: IndexMap<String, Tool>,
    pending: HashMap<Cid, PendingWaiter>,
    gen_slots: HashMap<Cid, mpsc::Sender<Chunk>>,
    cur_gen_opts: Option<GenOpts>,
}

impl SequenceState {
    fn new(model: String, tools_enabled: bool) -> Self {
        Self {
            model,
            tools_enabled,
            tools: IndexMap::new(),
            pending: HashMap::new(),
            gen_slots: HashMap::new(),
            cur_gen_opts: None,
        }
    }
}

/// An opening waiter carries the model/tools_enabled that will seed the new
/// sequence's state once `seq_opened` names its `seq_id` — the opening
/// waiter table has no sequence to hang this off yet.
struct OpeningWaiter {
    model: String,
    tools_enabled: bool,
    respond: oneshot::Sender<Result<SeqId>>,
}

#[derive(Default)]
struct ActorState {
    opening_waiters: HashMap<Cid, OpeningWaiter>,
    sequences: HashMap<SeqId, SequenceState>,
}

impl ActorState {
    fn teardown(&mut self) {
        for (_, waiter) in self.opening_waiters.drain() {
            let _ = waiter.respond.send(Err(ModelSocketError::Lifecycle(
                LifecycleError::ConnectionClosed,
            )));
        }
        for (_, mut seq) in self.sequences.drain() {
            for (_, waiter) in seq.pending.drain() {
                reject_pending(waiter, LifecycleError::SeqClosed);
            }
            seq.gen_slots.clear();
        }
    }
}

pub(crate) enum ActorMsg {
    Open {
        cid: Cid,
        model: String,
        options: OpenOptions,
        respond: oneshot::Sender<Result<SeqId>>,
    },
    Append {
        seq_id: SeqId,
        cid: Cid,
        text: Option<String>,
        tokens: Option<Vec<i64>>,
        role: Option<String>,
        hidden: Option<bool>,
        respond: oneshot::Sender<Result<()>>,
    },
    Gen {
        seq_id: SeqId,
        cid: Cid,
        opts: GenOpts,
        tx: mpsc::Sender<Chunk>,
    },
    Fork {
        seq_id: SeqId,
        cid: Cid,
        respond: oneshot::Sender<Result<SeqId>>,
    },
    Close {
        seq_id: SeqId,
        cid: Cid,
        respond: oneshot::Sender<Result<()>>,
    },
    CheckToolName {
        seq_id: SeqId,
        name: String,
        respond: oneshot::Sender<Result<()>>,
    },
    CommitTool {
        seq_id: SeqId,
        tool: Tool,
    },
    LiveSequenceCount {
        respond: oneshot::Sender<usize>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

async fn run_actor(mut transport: Box<dyn Transport>, mut cmd_rx: mpsc::UnboundedReceiver<ActorMsg>) {
    let mut state = ActorState::default();
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ActorMsg::Shutdown { ack }) => {
                        state.teardown();
                        let _ = ack.send(());
                        break;
                    }
                    Some(cmd) => handle_cmd(&mut transport, &mut state, cmd).await,
                    None => {
                        state.teardown();
                        break;
                    }
                }
            }
            frame = transport.recv() => {
                match frame {
                    Ok(Some(text)) => handle_frame(&mut transport, &mut state, &text).await,
                    Ok(None) => {
                        debug!("transport closed by peer");
                        state.teardown();
                        break;
                    }
                    Err(e) => {
                        warn!("transport error: {e}");
                        state.teardown();
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_cmd(transport: &mut Box<dyn Transport>, state: &mut ActorState, cmd: ActorMsg) {
    match cmd {
        ActorMsg::Shutdown { .. } => unreachable!("handled in run_actor"),
        ActorMsg::Open {
            cid,
            model,
            options,
            respond,
        } => {
            let waiter = OpeningWaiter {
                model: model.clone(),
                tools_enabled: options.tools,
                respond,
            };
            let data = SeqOpenData {
                model,
                tools_enabled: Some(options.tools),
                tool_prompt: options.tool_prompt,
                skip_prelude: options.skip_prelude,
            };
            let frame = OutboundFrame::seq_open(cid.clone(), data);
            send_or_reject_open(transport, state, cid, frame, waiter).await;
        }
        ActorMsg::Append {
            seq_id,
            cid,
            text,
            tokens,
            role,
            hidden,
            respond,
        } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                let _ = respond.send(Err(ModelSocketError::State(seq_id.to_string())));
                return;
            };
            let frame = OutboundFrame::seq_command(
                cid.clone(),
                seq_id.clone(),
                SeqCommandData::Append {
                    text,
                    tokens,
                    role,
                    hidden,
                },
            );
            seq.pending.insert(cid.clone(), PendingWaiter::Append(respond));
            send_command_frame(transport, seq, cid, frame).await;
        }
        ActorMsg::Gen {
            seq_id,
            cid,
            opts,
            tx,
        } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                warn!(%seq_id, "gen sent against unknown sequence");
                return;
            };
            let frame = OutboundFrame::seq_command(
                cid.clone(),
                seq_id.clone(),
                SeqCommandData::Gen {
                    role: opts.role.clone(),
                    tokens: opts.tokens,
                    temperature: opts.temperature,
                },
            );
            seq.gen_slots.insert(cid.clone(), tx);
            seq.cur_gen_opts = Some(opts);
            seq.pending.insert(cid.clone(), PendingWaiter::Gen);
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if let Err(e) = transport.send(text).await {
                        warn!(%cid, "failed to send gen frame: {e}");
                        seq.gen_slots.remove(&cid);
                        seq.cur_gen_opts = None;
                        seq.pending.remove(&cid);
                    }
                }
                Err(e) => {
                    warn!(%cid, "failed to serialize gen frame: {e}");
                    seq.gen_slots.remove(&cid);
                    seq.cur_gen_opts = None;
                    seq.pending.remove(&cid);
                }
            }
        }
        ActorMsg::Fork { seq_id, cid, respond } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                let _ = respond.send(Err(ModelSocketError::State(seq_id.to_string())));
                return;
            };
            let frame = OutboundFrame::seq_command(cid.clone(), seq_id.clone(), SeqCommandData::Fork {});
            seq.pending.insert(cid.clone(), PendingWaiter::Fork(respond));
            send_command_frame(transport, seq, cid, frame).await;
        }
        ActorMsg::Close { seq_id, cid, respond } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                let _ = respond.send(Err(ModelSocketError::State(seq_id.to_string())));
                return;
            };
            let frame = OutboundFrame::seq_command(cid.clone(), seq_id.clone(), SeqCommandData::Close {});
            seq.pending.insert(cid.clone(), PendingWaiter::Close(respond));
            send_command_frame(transport, seq, cid, frame).await;
        }
        ActorMsg::CheckToolName { seq_id, name, respond } => {
            let Some(seq) = state.sequences.get(&seq_id) else {
                let _ = respond.send(Err(ModelSocketError::State(seq_id.to_string())));
                return;
            };
            if seq.tools.contains_key(&name) {
                let _ = respond.send(Err(ModelSocketError::Caller(format!(
                    "tool '{name}' is already installed on this sequence"
                ))));
            } else {
                let _ = respond.send(Ok(()));
            }
        }
        ActorMsg::CommitTool { seq_id, tool } => {
            if let Some(seq) = state.sequences.get_mut(&seq_id) {
                seq.tools.insert(tool.name.clone(), tool);
            }
        }
        ActorMsg::LiveSequenceCount { respond } => {
            let _ = respond.send(state.sequences.len());
        }
    }
}

async fn send_or_reject_open(
    transport: &mut Box<dyn Transport>,
    state: &mut ActorState,
    cid: Cid,
    frame: OutboundFrame,
    waiter: OpeningWaiter,
) {
    let text = match serde_json::to_string(&frame) {
        Ok(text) => text,
        Err(e) => {
            let _ = waiter.respond.send(Err(e.into()));
            return;
        }
    };
    state.opening_waiters.insert(cid.clone(), waiter);
    if let Err(e) = transport.send(text).await {
        if let Some(waiter) = state.opening_waiters.remove(&cid) {
            let _ = waiter
                .respond
                .send(Err(ModelSocketError::Transport(e.to_string())));
        }
    }
}

async fn send_command_frame(
    transport: &mut Box<dyn Transport>,
    seq: &mut SequenceState,
    cid: Cid,
    frame: OutboundFrame,
) {
    match serde_json::to_string(&frame) {
        Ok(text) => {
            if let Err(e) = transport.send(text).await {
                if let Some(waiter) = seq.pending.remove(&cid) {
                    reject_command_send_failure(waiter, &e.to_string());
                }
            }
        }
        Err(e) => {
            if let Some(waiter) = seq.pending.remove(&cid) {
                reject_command_send_failure(waiter, &e.to_string());
            }
        }
    }
}

fn reject_command_send_failure(waiter: PendingWaiter, message: &str) {
    let err = || ModelSocketError::Transport(message.to_string());
    match waiter {
        PendingWaiter::Append(tx) => {
            let _ = tx.send(Err(err()));
        }
        PendingWaiter::Gen => {}
        PendingWaiter::Fork(tx) => {
            let _ = tx.send(Err(err()));
        }
        PendingWaiter::Close(tx) => {
            let _ = tx.send(Err(err()));
        }
    }
}

async fn handle_frame(transport: &mut Box<dyn Transport>, state: &mut ActorState, text: &str) {
    let event: InboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("dropping malformed inbound frame: {e}");
            return;
        }
    };
    match event {
        InboundEvent::SeqOpened { cid, seq_id } => {
            debug!(%cid, %seq_id, "seq_opened");
            if let Some(waiter) = state.opening_waiters.remove(&cid) {
                state.sequences.insert(
                    seq_id.clone(),
                    SequenceState::new(waiter.model, waiter.tools_enabled),
                );
                let _ = waiter.respond.send(Ok(seq_id));
            } else {
                warn!(%cid, "seq_opened with no matching opening waiter");
            }
        }
        InboundEvent::Error { cid, message } => {
            let message = message.unwrap_or_else(|| "unknown server error".to_string());
            match cid.and_then(|cid| state.opening_waiters.remove(&cid).map(|w| (cid, w))) {
                Some((cid, waiter)) => {
                    debug!(%cid, %message, "error event resolves opening waiter");
                    let _ = waiter.respond.send(Err(ModelSocketError::Server(message)));
                }
                None => warn!(%message, "server error event with no matching opening waiter"),
            }
        }
        InboundEvent::SeqClosed { cid, seq_id } => {
            let Some(mut seq) = state.sequences.remove(&seq_id) else {
                warn!(%seq_id, "seq_closed for unknown sequence");
                return;
            };
            if let Some(cid) = cid
                && let Some(PendingWaiter::Close(tx)) = seq.pending.remove(&cid)
            {
                let _ = tx.send(Ok(()));
            }
            for (_, waiter) in seq.pending.drain() {
                reject_pending(waiter, LifecycleError::SeqClosed);
            }
            seq.gen_slots.clear();
        }
        InboundEvent::SeqText {
            cid,
            seq_id,
            text,
            tokens,
            hidden,
        } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                warn!(%seq_id, "seq_text for unknown sequence");
                return;
            };
            if let Some(tx) = seq.gen_slots.get(&cid).cloned() {
                let chunk = Chunk {
                    text: text.unwrap_or_default(),
                    tokens,
                    hidden: hidden.unwrap_or(false),
                };
                if tx.send(chunk).await.is_err() {
                    debug!(%cid, "gen stream consumer dropped; discarding chunk");
                }
            }
        }
        InboundEvent::SeqAppendFinish { cid, seq_id } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                warn!(%seq_id, "seq_append_finish for unknown sequence");
                return;
            };
            if let Some(PendingWaiter::Append(tx)) = seq.pending.remove(&cid) {
                let _ = tx.send(Ok(()));
            } else {
                warn!(%cid, "seq_append_finish with no matching append waiter");
            }
        }
        InboundEvent::SeqGenFinish { cid, seq_id } => {
            let Some(seq) = state.sequences.get_mut(&seq_id) else {
                warn!(%seq_id, "seq_gen_finish for unknown sequence");
                return;
            };
            seq.gen_slots.remove(&cid);
            seq.cur_gen_opts = None;
            if seq.pending.remove(&cid).is_none() {
                warn!(%cid, "seq_gen_finish with no matching gen waiter");
            }
        }
        InboundEvent::SeqForkFinish {
            cid,
            seq_id,
            child_seq_id,
        } => {
            let found = {
                let Some(seq) = state.sequences.get_mut(&seq_id) else {
                    warn!(%seq_id, "seq_fork_finish for unknown sequence");
                    return;
                };
                match seq.pending.remove(&cid) {
                    Some(PendingWaiter::Fork(tx)) => Some((seq.model.clone(), seq.tools_enabled, tx)),
                    Some(other) => {
                        reject_pending(other, LifecycleError::SeqClosed);
                        None
                    }
                    None => {
                        warn!(%cid, "seq_fork_finish with no matching fork waiter");
                        None
                    }
                }
            };
            let Some((model, tools_enabled, tx)) = found else {
                return;
            };
            match child_seq_id {
                Some(child_id) => {
                    // child_seq_id names a new sequence with no tools of its
                    // own; the server never copies the parent's installed
                    // tools onto a fork, so they must be reinstalled here.
                    state
                        .sequences
                        .insert(child_id.clone(), SequenceState::new(model, tools_enabled));
                    let _ = tx.send(Ok(child_id));
                }
                None => {
                    let _ = tx.send(Err(ModelSocketError::Caller(
                        "child seq id missing".to_string(),
                    )));
                }
            }
        }
        InboundEvent::SeqToolCall {
            cid,
            seq_id,
            tool_calls,
        } => {
            handle_tool_call(transport, state, cid, seq_id, tool_calls).await;
        }
        InboundEvent::Unknown => {
            warn!("dropping unrecognized event kind");
        }
    }
}

async fn handle_tool_call(
    transport: &mut Box<dyn Transport>,
    state: &mut ActorState,
    cid: Cid,
    seq_id: SeqId,
    tool_calls: Vec<modelsocket_protocol::ToolCallRequest>,
) {
    let Some(seq) = state.sequences.get(&seq_id) else {
        warn!(%seq_id, "seq_tool_call for unknown sequence");
        return;
    };
    let gen_opts = seq.cur_gen_opts.clone().unwrap_or_default();
    let mut results = Vec::with_capacity(tool_calls.len());
    // Sequential by design: concurrency across tool calls in one batch is
    // a future extension, not a correctness requirement here.
    for call in tool_calls {
        let Some(tool) = state
            .sequences
            .get(&seq_id)
            .and_then(|seq| seq.tools.get(&call.name))
        else {
            warn!(name = %call.name, "tool_call for an uninstalled tool");
            continue;
        };
        let args = serde_json::from_str(&call.args)
            .unwrap_or_else(|_| serde_json::Value::String(call.args.clone()));
        match tool.invoke(args).await {
            Ok(value) => match serde_json::to_string(&value) {
                Ok(result) => results.push(ToolResultPayload {
                    name: call.name.clone(),
                    result,
                }),
                Err(e) => warn!(name = %call.name, "failed to serialize tool result: {e}"),
            },
            Err(e) => warn!(name = %call.name, "tool invocation failed: {e}"),
        }
    }
    let frame = OutboundFrame::seq_command(
        cid,
        seq_id,
        SeqCommandData::ToolReturn { gen_opts, results },
    );
    match serde_json::to_string(&frame) {
        Ok(text) => {
            if let Err(e) = transport.send(text).await {
                warn!("failed to send tool_return: {e}");
            }
        }
        Err(e) => warn!("failed to serialize tool_return: {e}"),
    }
}

